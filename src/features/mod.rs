/// 黑白照片着色
pub mod colorize;
/// 健康检查
pub mod health;
