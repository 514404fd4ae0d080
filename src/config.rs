use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 全局配置单例（仅承载进程级配置；模型等运行期资源放在 `AppState` 中显式传递）
static CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
}

impl ServerConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }
    fn default_port() -> u16 {
        3030
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

/// 推理后端类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    /// ONNX Runtime（需要启用 `onnx` feature）
    #[default]
    Onnx,
    /// 中性色度（输出灰度图），用于无模型环境的冒烟部署
    Neutral,
}

impl ModelBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelBackend::Onnx => "onnx",
            ModelBackend::Neutral => "neutral",
        }
    }
}

/// 模型配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// 推理后端
    #[serde(default)]
    pub backend: ModelBackend,
    /// 生成器模型文件路径（ONNX）
    #[serde(default = "ModelConfig::default_path")]
    pub path: String,
    /// 输入张量名（缺省取模型第一个输入）
    #[serde(default)]
    pub input_name: Option<String>,
    /// 输出张量名（缺省取模型第一个输出）
    #[serde(default)]
    pub output_name: Option<String>,
    /// 单次推理的算子内线程数（0=由运行时决定）
    #[serde(default)]
    pub intra_threads: usize,
}

impl ModelConfig {
    fn default_path() -> String {
        "./models/colorizer.onnx".to_string()
    }

    /// 获取模型文件路径
    pub fn model_path(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: ModelBackend::default(),
            path: Self::default_path(),
            input_name: None,
            output_name: None,
            intra_threads: 0,
        }
    }
}

/// 推理并发配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InferenceConfig {
    /// 并发着色许可数（0=自动，取 CPU 核心数）
    #[serde(default)]
    pub max_parallel: u32,
}

impl InferenceConfig {
    /// 实际生效的并发许可数
    pub fn effective_parallelism(&self) -> usize {
        match self.max_parallel {
            0 => num_cpus::get(),
            n => n as usize,
        }
    }
}

/// 上传限制配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 请求体最大字节数
    #[serde(default = "UploadConfig::default_max_bytes")]
    pub max_bytes: usize,
    /// 解码时允许的最大边长（像素）
    #[serde(default = "UploadConfig::default_max_dimension")]
    pub max_dimension: u32,
}

impl UploadConfig {
    fn default_max_bytes() -> usize {
        10 * 1024 * 1024
    }
    fn default_max_dimension() -> u32 {
        8192
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: Self::default_max_bytes(),
            max_dimension: Self::default_max_dimension(),
        }
    }
}

/// 输出容器格式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    #[default]
    Jpeg,
    /// 无损输出，主要用于排查模型质量问题
    Png,
}

/// 输出图片配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// 输出格式：jpeg 或 png
    #[serde(default)]
    pub format: OutputKind,
    /// JPEG 质量：1-100（仅 jpeg 生效）
    #[serde(default = "OutputConfig::default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl OutputConfig {
    fn default_jpeg_quality() -> u8 {
        75
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputKind::default(),
            jpeg_quality: Self::default_jpeg_quality(),
        }
    }
}

/// 优雅退出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// 优雅退出超时时间（秒）
    #[serde(default = "ShutdownConfig::default_timeout")]
    pub timeout_secs: u64,
}

impl ShutdownConfig {
    fn default_timeout() -> u64 {
        30
    }

    /// 获取优雅退出超时时间
    pub fn timeout_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// 模型配置
    #[serde(default)]
    pub model: ModelConfig,
    /// 推理并发配置
    #[serde(default)]
    pub inference: InferenceConfig,
    /// 上传限制
    #[serde(default)]
    pub upload: UploadConfig,
    /// 输出图片配置
    #[serde(default)]
    pub output: OutputConfig,
    /// 优雅退出配置
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl AppConfig {
    /// 从配置文件加载配置（文件可缺省），支持环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path();

        tracing::info!("正在从 {:?} 加载配置文件", config_path);

        let builder = ConfigBuilder::builder()
            .add_source(File::from(config_path).required(false))
            // 支持环境变量覆盖，例如：APP_SERVER__PORT、APP_MODEL__BACKEND
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        builder.try_deserialize()
    }

    /// 获取全局配置单例
    pub fn global() -> &'static AppConfig {
        CONFIG.get().expect("配置未初始化，请先调用 init_global()")
    }

    /// 初始化全局配置
    pub fn init_global() -> Result<&'static AppConfig, ConfigError> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| ConfigError::Message("配置已经被初始化".to_string()))?;
        Ok(Self::global())
    }

    /// 获取配置文件路径（可通过 APP_CONFIG_PATH 指定）
    fn get_config_path() -> PathBuf {
        std::env::var("APP_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"))
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
