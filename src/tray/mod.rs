//! System tray presence
//!
//! [`TrayBridge`] runs the icon on its own dispatch thread. The backend is
//! chosen per platform by [`platform_factory`].

mod bridge;
#[cfg(not(windows))]
mod headless;
#[cfg_attr(not(windows), allow(dead_code))]
pub mod icon;
#[cfg(windows)]
mod native;

use std::sync::Arc;

pub use bridge::{BackendFactory, TrayBridge, TrayIntent};
#[cfg(not(windows))]
use headless::HeadlessTray;

/// Backend factory for the current platform
pub fn platform_factory() -> BackendFactory {
    #[cfg(windows)]
    {
        Arc::new(native::NativeTray::create)
    }
    #[cfg(not(windows))]
    {
        Arc::new(HeadlessTray::create)
    }
}
