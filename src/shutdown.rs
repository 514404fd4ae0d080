//! 优雅退出管理模块
//!
//! 监听 SIGINT/SIGTERM（Windows 上为 Ctrl+C），通知 HTTP 服务停止接收新请求，
//! 并在限定时间内等待进行中的着色任务结束。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// 退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// 用户中断信号 (Ctrl+C)
    Interrupt,
    /// 终止信号 (SIGTERM)
    Terminate,
    /// 应用请求退出
    Application,
}

/// 优雅退出错误类型
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("信号设置失败: {0}")]
    SignalSetup(String),

    #[error("等待进行中的任务超时（剩余 {0} 个）")]
    DrainTimeout(usize),

    #[error("信号量已关闭")]
    SemaphoreClosed,
}

/// 优雅退出管理器
///
/// 只记录第一次触发的原因，后续触发被忽略。
#[derive(Debug, Clone)]
pub struct ShutdownManager {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// 触发优雅退出
    pub fn trigger_shutdown(&self, reason: ShutdownReason) {
        let first = self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
        if first {
            info!("触发优雅退出: {:?}", reason);
        } else {
            debug!("重复的退出信号被忽略");
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// 等待退出信号；已触发时立即返回
    pub async fn wait_for_shutdown(&self) -> ShutdownReason {
        let mut rx = self.tx.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.unwrap_or(ShutdownReason::Application),
            // 发送端与 self 同生命周期，不会先于接收端关闭
            Err(_) => ShutdownReason::Application,
        }
    }

    /// 启动信号处理器
    pub async fn start_signal_handler(&self) -> Result<(), ShutdownError> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigint = signal(SignalKind::interrupt())
                .map_err(|e| ShutdownError::SignalSetup(e.to_string()))?;
            let mut sigterm = signal(SignalKind::terminate())
                .map_err(|e| ShutdownError::SignalSetup(e.to_string()))?;

            let manager = self.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = sigint.recv() => {
                        info!("接收到SIGINT信号 (Ctrl+C)");
                        manager.trigger_shutdown(ShutdownReason::Interrupt);
                    }
                    _ = sigterm.recv() => {
                        info!("接收到SIGTERM信号");
                        manager.trigger_shutdown(ShutdownReason::Terminate);
                    }
                }
            });
        }

        #[cfg(windows)]
        {
            let manager = self.clone();
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("监听Ctrl+C信号失败: {}", e);
                    return;
                }
                info!("接收到Ctrl+C信号");
                manager.trigger_shutdown(ShutdownReason::Interrupt);
            });
        }

        info!("信号处理器已启动");
        Ok(())
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 等待所有推理许可归还（即进行中的着色任务全部结束）。
///
/// `total` 为信号量的初始许可数；超时返回仍未结束的任务数。
pub async fn drain_inflight(
    semaphore: &Semaphore,
    total: usize,
    deadline: Duration,
) -> Result<(), ShutdownError> {
    let permits = u32::try_from(total).unwrap_or(u32::MAX);
    match timeout(deadline, semaphore.acquire_many(permits)).await {
        Ok(Ok(_all)) => Ok(()),
        Ok(Err(_)) => Err(ShutdownError::SemaphoreClosed),
        Err(_) => {
            let remaining = total.saturating_sub(semaphore.available_permits());
            warn!("仍有 {} 个着色任务未完成", remaining);
            Err(ShutdownError::DrainTimeout(remaining))
        }
    }
}
