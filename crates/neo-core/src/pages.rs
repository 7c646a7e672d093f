//! Display page navigation
//!
//! The navigator only decides which page is current. Drawing is delegated to
//! a [`DisplayPages`] implementation after every change.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::buttons::Command;
use crate::{CoreError, Result};

/// Period covered by a statistics page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsPeriod {
    Hour,
    Day,
    Week,
    Month,
}

impl StatsPeriod {
    pub fn all() -> [StatsPeriod; 4] {
        [
            StatsPeriod::Hour,
            StatsPeriod::Day,
            StatsPeriod::Week,
            StatsPeriod::Month,
        ]
    }
}

/// Maintenance action offered on the admin stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAction {
    CopyFromUsb,
    EraseFolder,
}

impl AdminAction {
    /// Name used in configuration and logs
    pub fn name(&self) -> &'static str {
        match self {
            AdminAction::CopyFromUsb => "copy_from_usb",
            AdminAction::EraseFolder => "erase_folder",
        }
    }
}

/// Identity of a display page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageId {
    Splash,
    Blank,
    LowBatteryWarning,
    Main,
    Info,
    Battery,
    Memory,
    Stats { period: StatsPeriod, interface: u8 },
    ShowAdmin,
    Admin(AdminAction),
    Exit,
    Confirm(AdminAction),
    Wait,
    Success,
    Error,
}

impl PageId {
    /// Default status rotation
    pub fn status_pages() -> Vec<PageId> {
        let mut pages = vec![PageId::Main, PageId::Info, PageId::Battery, PageId::Memory];
        for interface in 1..=2 {
            for period in StatsPeriod::all() {
                pages.push(PageId::Stats { period, interface });
            }
        }
        pages.push(PageId::ShowAdmin);
        pages
    }

    /// Default admin stack; Exit is last
    pub fn admin_pages() -> Vec<PageId> {
        vec![
            PageId::Admin(AdminAction::CopyFromUsb),
            PageId::Admin(AdminAction::EraseFolder),
            PageId::Exit,
        ]
    }
}

/// The two page rotations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stack {
    Status,
    Admin,
}

/// What the current page means for button handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageContext {
    Status,
    Admin,
    /// Confirming an admin action, or waiting for it
    Confirm,
    /// Showing an admin action outcome
    Result,
}

/// Draws pages on the physical display
pub trait DisplayPages: Send {
    fn render(&mut self, page: PageId) -> neo_hal::Result<()>;
}

/// Tracks the current page and the display power-off deadline
pub struct PageNavigator {
    display: Box<dyn DisplayPages>,
    status: Vec<PageId>,
    admin: Vec<PageId>,
    stack: Stack,
    current: PageId,
    timeout: Duration,
    /// `None` holds the display on indefinitely
    power_off_at: Option<Instant>,
}

impl PageNavigator {
    /// Create a navigator on the blank page. Both stacks must be non-empty.
    pub fn new(
        display: Box<dyn DisplayPages>,
        status: Vec<PageId>,
        admin: Vec<PageId>,
        timeout: Duration,
    ) -> Result<Self> {
        if status.is_empty() {
            return Err(CoreError::EmptyStack("status"));
        }
        if admin.is_empty() {
            return Err(CoreError::EmptyStack("admin"));
        }

        Ok(Self {
            display,
            status,
            admin,
            stack: Stack::Status,
            current: PageId::Blank,
            timeout,
            power_off_at: None,
        })
    }

    /// Navigator with the standard status and admin stacks
    pub fn with_default_stacks(display: Box<dyn DisplayPages>, timeout: Duration) -> Result<Self> {
        Self::new(display, PageId::status_pages(), PageId::admin_pages(), timeout)
    }

    /// Show the splash page until `splash` has elapsed
    pub fn start(&mut self, now: Instant, splash: Duration) {
        self.show(PageId::Splash);
        self.power_off_at = now.checked_add(splash);
    }

    pub fn current(&self) -> PageId {
        self.current
    }

    pub fn stack(&self) -> Stack {
        self.stack
    }

    /// Display power-off deadline, `None` while held on. A timeout too far
    /// out to represent also holds the display on.
    pub fn power_off_at(&self) -> Option<Instant> {
        self.power_off_at
    }

    pub fn context(&self) -> PageContext {
        match self.current {
            PageId::Confirm(_) | PageId::Wait => PageContext::Confirm,
            PageId::Success | PageId::Error => PageContext::Result,
            _ => match self.stack {
                Stack::Status => PageContext::Status,
                Stack::Admin => PageContext::Admin,
            },
        }
    }

    fn pages(&self) -> &[PageId] {
        match self.stack {
            Stack::Status => &self.status,
            Stack::Admin => &self.admin,
        }
    }

    fn position(&self) -> Option<usize> {
        self.pages().iter().position(|page| *page == self.current)
    }

    pub fn move_forward(&mut self) {
        let pages = self.pages();
        let next = match self.position() {
            Some(index) => pages[(index + 1) % pages.len()],
            None => pages[0],
        };
        self.show(next);
    }

    pub fn move_backward(&mut self) {
        let pages = self.pages();
        let next = match self.position() {
            Some(index) => pages[(index + pages.len() - 1) % pages.len()],
            None => pages[0],
        };
        self.show(next);
    }

    /// Toggle between the status and admin stacks
    pub fn switch_stack(&mut self) {
        self.stack = match self.stack {
            Stack::Status => Stack::Admin,
            Stack::Admin => Stack::Status,
        };
        tracing::info!("Switched to {:?} pages", self.stack);
        let first = self.pages()[0];
        self.show(first);
    }

    pub fn power_off(&mut self) {
        self.show(PageId::Blank);
    }

    /// Show the low battery warning and keep the display on
    pub fn show_low_battery_warning(&mut self) {
        self.power_off_at = None;
        if self.current != PageId::LowBatteryWarning {
            self.show(PageId::LowBatteryWarning);
        }
    }

    /// Blank the display if the warning is showing
    pub fn hide_low_battery_warning(&mut self) {
        if self.current == PageId::LowBatteryWarning {
            self.power_off();
        }
    }

    /// Enter on the current page. Returns the admin action to run when a
    /// confirmation was accepted.
    pub fn enter(&mut self) -> Option<AdminAction> {
        match self.current {
            PageId::Exit => {
                self.switch_stack();
                None
            }
            PageId::Admin(action) => {
                self.show(PageId::Confirm(action));
                None
            }
            PageId::Confirm(action) => {
                self.show(PageId::Wait);
                Some(action)
            }
            _ => None,
        }
    }

    /// Leave a confirmation or result page for the first admin page
    pub fn cancel(&mut self) {
        self.stack = Stack::Admin;
        let first = self.admin[0];
        self.show(first);
    }

    /// Show the outcome of an admin action
    pub fn show_outcome(&mut self, success: bool, now: Instant) {
        self.show(if success { PageId::Success } else { PageId::Error });
        self.touch(now);
    }

    /// Apply a button command and restart the inactivity timeout
    pub fn apply(&mut self, command: Command, now: Instant) -> Option<AdminAction> {
        tracing::debug!("Display command {:?} on {:?}", command, self.current);
        let action = match command {
            Command::MoveForward => {
                self.move_forward();
                None
            }
            Command::MoveBackward => {
                self.move_backward();
                None
            }
            Command::SwitchStack => {
                self.switch_stack();
                None
            }
            Command::PowerOff => {
                self.power_off();
                None
            }
            Command::Enter => self.enter(),
            Command::Cancel => {
                self.cancel();
                None
            }
        };
        if self.current == PageId::Wait {
            // held on until the outcome arrives
            self.power_off_at = None;
        } else {
            self.touch(now);
        }
        action
    }

    /// Restart the inactivity timeout
    pub fn touch(&mut self, now: Instant) {
        self.power_off_at = now.checked_add(self.timeout);
    }

    /// Blank the display once the timeout has passed. Returns true when it
    /// blanked.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.power_off_at {
            Some(deadline) if now >= deadline && self.current != PageId::Blank => {
                tracing::debug!("Display timeout");
                self.power_off();
                self.stack = Stack::Status;
                true
            }
            _ => false,
        }
    }

    fn show(&mut self, page: PageId) {
        self.current = page;
        if let Err(e) = self.display.render(page) {
            tracing::warn!("Failed to render {:?}: {}", page, e);
        }
    }
}
