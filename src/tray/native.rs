//! Windows notification-area backend built on `tray-icon`
//!
//! Must be created and driven on the dispatch thread: the hidden window
//! behind the icon receives its messages on the thread that registered it.

use muda::{Menu, MenuEvent, MenuId, MenuItem, PredefinedMenuItem};
use tray_icon::{Icon, MouseButton, MouseButtonState, TrayIcon, TrayIconBuilder, TrayIconEvent};
use windows::Win32::Foundation::HWND;
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE,
};

use super::bridge::{TrayBackend, TrayError, TrayGesture};
use super::icon::{app_icon_rgba, ICON_SIZE};

pub struct NativeTray {
    tray: Option<TrayIcon>,
    restore_id: MenuId,
    exit_id: MenuId,
    /// Ids of the menu replaced last, for selections queued behind a rebuild
    previous_ids: Option<(MenuId, MenuId)>,
}

/// Restore, separator, Exit
fn build_menu() -> (Menu, MenuId, MenuId) {
    let menu = Menu::new();
    let restore = MenuItem::new("Restore", true, None);
    let exit = MenuItem::new("Exit", true, None);
    let separator = PredefinedMenuItem::separator();
    if let Err(e) = menu.append_items(&[&restore, &separator, &exit]) {
        tracing::warn!("Failed to build tray menu: {}", e);
    }
    let (restore_id, exit_id) = (restore.id().clone(), exit.id().clone());
    (menu, restore_id, exit_id)
}

impl NativeTray {
    pub fn create(tooltip: &str) -> Result<Box<dyn TrayBackend>, TrayError> {
        let icon = Icon::from_rgba(app_icon_rgba(ICON_SIZE), ICON_SIZE, ICON_SIZE)
            .map_err(|e| TrayError::Register(e.to_string()))?;
        let (menu, restore_id, exit_id) = build_menu();

        let tray = TrayIconBuilder::new()
            .with_tooltip(tooltip)
            .with_icon(icon)
            .with_menu(Box::new(menu))
            .with_menu_on_left_click(false)
            .build()
            .map_err(|e| TrayError::Register(e.to_string()))?;

        Ok(Box::new(Self {
            tray: Some(tray),
            restore_id,
            exit_id,
            previous_ids: None,
        }))
    }

    /// Swap in a fresh menu so no handle outlives the popup that used it
    fn rebuild_menu(&mut self) {
        let (menu, restore_id, exit_id) = build_menu();
        if let Some(tray) = &self.tray {
            tray.set_menu(Some(Box::new(menu)));
        }
        let restore_old = std::mem::replace(&mut self.restore_id, restore_id);
        let exit_old = std::mem::replace(&mut self.exit_id, exit_id);
        self.previous_ids = Some((restore_old, exit_old));
    }

    fn menu_gesture(&self, id: &MenuId) -> Option<TrayGesture> {
        let previous = self.previous_ids.as_ref();
        if *id == self.restore_id || previous.is_some_and(|(restore, _)| id == restore) {
            Some(TrayGesture::MenuRestore)
        } else if *id == self.exit_id || previous.is_some_and(|(_, exit)| id == exit) {
            Some(TrayGesture::MenuExit)
        } else {
            None
        }
    }
}

/// What an icon event means to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IconAction {
    Restore,
    /// The context menu was just shown
    MenuShown,
}

fn icon_action(event: &TrayIconEvent) -> Option<IconAction> {
    match event {
        TrayIconEvent::DoubleClick {
            button: MouseButton::Left,
            ..
        } => Some(IconAction::Restore),
        TrayIconEvent::Click {
            button: MouseButton::Right,
            button_state: MouseButtonState::Up,
            ..
        } => Some(IconAction::MenuShown),
        _ => None,
    }
}

fn pump_messages() {
    // SAFETY: plain Win32 message pump on the thread that owns the windows
    unsafe {
        let mut msg = MSG::default();
        while PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_REMOVE).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

impl TrayBackend for NativeTray {
    fn set_tooltip(&mut self, text: &str) {
        if let Some(tray) = &self.tray {
            if let Err(e) = tray.set_tooltip(Some(text)) {
                tracing::debug!("Failed to update tray tooltip: {}", e);
            }
        }
    }

    fn pump(&mut self) -> Vec<TrayGesture> {
        pump_messages();

        let mut gestures = Vec::new();
        let mut menu_used = false;
        while let Ok(event) = TrayIconEvent::receiver().try_recv() {
            match icon_action(&event) {
                Some(IconAction::Restore) => gestures.push(TrayGesture::DoubleClick),
                Some(IconAction::MenuShown) => menu_used = true,
                None => {}
            }
        }

        while let Ok(event) = MenuEvent::receiver().try_recv() {
            if let Some(gesture) = self.menu_gesture(&event.id) {
                gestures.push(gesture);
            }
            menu_used = true;
        }
        // Every popup, chosen or dismissed, gets a fresh menu next time
        if menu_used {
            self.rebuild_menu();
        }

        gestures
    }

    fn remove(&mut self) {
        // Dropping the TrayIcon deletes the notification icon and its icon handle
        if let Some(tray) = self.tray.take() {
            let _ = tray.set_visible(false);
            drop(tray);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tray_icon::dpi::PhysicalPosition;
    use tray_icon::{Rect, TrayIconId};

    fn click(button: MouseButton, button_state: MouseButtonState) -> TrayIconEvent {
        TrayIconEvent::Click {
            id: TrayIconId::new("enforcer"),
            position: PhysicalPosition::new(0.0, 0.0),
            rect: Rect::default(),
            button,
            button_state,
        }
    }

    #[test]
    fn test_right_click_marks_menu_for_rebuild() {
        assert_eq!(
            icon_action(&click(MouseButton::Right, MouseButtonState::Up)),
            Some(IconAction::MenuShown)
        );
        assert_eq!(
            icon_action(&click(MouseButton::Right, MouseButtonState::Down)),
            None
        );
        assert_eq!(
            icon_action(&click(MouseButton::Left, MouseButtonState::Up)),
            None
        );
    }

    #[test]
    fn test_left_double_click_restores() {
        let event = TrayIconEvent::DoubleClick {
            id: TrayIconId::new("enforcer"),
            position: PhysicalPosition::new(0.0, 0.0),
            rect: Rect::default(),
            button: MouseButton::Left,
        };
        assert_eq!(icon_action(&event), Some(IconAction::Restore));
    }
}
