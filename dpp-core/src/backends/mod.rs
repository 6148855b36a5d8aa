#[cfg(feature = "backend_wpa_ctrl")]
pub mod wpa_ctrl;

// 脚本化后端始终编译，测试依赖它
pub mod mock;

pub mod utils;
