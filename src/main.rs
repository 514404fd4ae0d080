use colorize_backend::features::colorize::load_colorizer;
use colorize_backend::shutdown::drain_inflight;
use colorize_backend::startup::run_startup_checks;
use colorize_backend::{AppState, ShutdownManager, build_router, config::AppConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "colorize_backend=info,tower_http=info".into()),
        )
        .init();

    // 创建优雅退出管理器
    let shutdown_manager = ShutdownManager::new();

    // Load config
    let config = match AppConfig::init_global() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Config init failed: {}", e);
            std::process::exit(1);
        }
    };

    // 启动信号处理器
    if let Err(e) = shutdown_manager.start_signal_handler().await {
        tracing::error!("信号处理器启动失败: {}", e);
        std::process::exit(1);
    }

    // Run startup checks
    if let Err(e) = run_startup_checks(config) {
        tracing::error!("Startup checks failed: {}", e);
        std::process::exit(1);
    }

    // 加载模型（可能较慢，放到阻塞线程池）
    let t_load = std::time::Instant::now();
    let model_config = config.model.clone();
    let colorizer = match tokio::task::spawn_blocking(move || load_colorizer(&model_config)).await
    {
        Ok(Ok(c)) => c,
        Ok(Err(e)) => {
            tracing::error!("模型加载失败: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!("模型加载任务异常: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        "推理后端 {} 已就绪，耗时: {}ms",
        colorizer.backend_name(),
        t_load.elapsed().as_millis()
    );

    let app_state = AppState::from_config(colorizer, config);
    let semaphore = app_state.inference_semaphore.clone();
    let max_parallel = app_state.max_parallel;
    tracing::info!("并发着色许可数: {}", max_parallel);

    let app = build_router(app_state, config.upload.max_bytes);

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Bind address failed {}: {}", addr, e);
            std::process::exit(1);
        });

    tracing::info!("Server: http://{}", addr);
    tracing::info!("Docs: http://{}/docs", addr);
    tracing::info!("Health: http://{}/health", addr);
    tracing::info!("Colorize API: POST http://{}/colorize", addr);

    let shutdown_timeout = config.shutdown.timeout_duration();
    let manager_for_signal = shutdown_manager.clone();
    let graceful = axum::serve(listener, app).with_graceful_shutdown(async move {
        let reason = manager_for_signal.wait_for_shutdown().await;
        tracing::info!("接收到退出信号: {:?}，开始优雅关闭HTTP服务器...", reason);
    });

    if let Err(e) = graceful.await {
        tracing::error!("服务器运行错误: {}", e);
        std::process::exit(1);
    }

    // 监听已关闭，等待仍在阻塞线程池中运行的着色任务
    tracing::info!(
        "优雅退出超时时间: {}秒",
        config.shutdown.timeout_secs
    );
    match drain_inflight(&semaphore, max_parallel, shutdown_timeout).await {
        Ok(()) => tracing::info!("服务器已优雅关闭"),
        Err(e) => tracing::warn!("优雅退出未完成，强制退出: {}", e),
    }
}
