// Hide console window on Windows release builds
#![cfg_attr(
    all(target_os = "windows", not(debug_assertions)),
    windows_subsystem = "windows"
)]

//! Layer Monitor - Entry Point
//!
//! Wires the HID monitor thread to the tray consumer: the monitor publishes
//! layer state over an event channel, and the winit event loop (required for
//! the tray icon on macOS) drains it on the main thread.

use anyhow::{Context, Result};
use layer_monitor::{
    core::{
        config::Config,
        events::{AppEvent, EventSender},
        publisher::StatePublisher,
    },
    hid::{self, device::DeviceFilter, monitor::MonitorHandle},
    tray::{TrayAction, TrayManager},
};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::WindowId,
};

/// Main application handler for the winit event loop
struct App {
    /// Event sender handed to the tray menu handler
    event_tx: EventSender,
    /// Event receiver for monitor and tray events
    event_rx: mpsc::UnboundedReceiver<AppEvent>,
    /// Tray manager (created once the event loop is running)
    tray_manager: Option<TrayManager>,
    /// Handle to the background monitor thread
    monitor: Option<MonitorHandle>,
}

impl App {
    fn new(
        event_tx: EventSender,
        event_rx: mpsc::UnboundedReceiver<AppEvent>,
        monitor: MonitorHandle,
    ) -> Self {
        Self {
            event_tx,
            event_rx,
            tray_manager: None,
            monitor: Some(monitor),
        }
    }

    /// Process an application event
    fn handle_event(&mut self, event: AppEvent, event_loop: &ActiveEventLoop) {
        match event {
            AppEvent::DeviceAttached { product } => {
                info!("Keyboard attached: {}", product);
                if let Some(ref mut tray) = self.tray_manager {
                    tray.set_attached(&product);
                }
            }
            AppEvent::LayerChanged(state) => {
                if let Some(ref mut tray) = self.tray_manager {
                    tray.set_layer(&state);
                }
            }
            AppEvent::SourceLost => {
                info!("Keyboard lost");
                if let Some(ref mut tray) = self.tray_manager {
                    tray.set_lost();
                }
            }
            AppEvent::TrayAction(TrayAction::Quit) => {
                info!("Quitting application...");
                if let Some(mut monitor) = self.monitor.take() {
                    monitor.stop();
                }
                event_loop.exit();
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);

        if self.tray_manager.is_none() {
            match TrayManager::new(self.event_tx.clone()) {
                Ok(tray) => {
                    self.tray_manager = Some(tray);
                    info!("Tray manager initialized");
                }
                Err(e) => {
                    error!("Failed to initialize tray manager: {}", e);
                    event_loop.exit();
                }
            }
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        _event: WindowEvent,
    ) {
        // No windows; the tray is the only surface
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_event(event, event_loop);
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }
    }
}

/// Set up macOS application as a tray-only accessory (no dock icon)
#[cfg(target_os = "macos")]
#[allow(deprecated)]
fn setup_macos_accessory() {
    use cocoa::appkit::NSApp;
    use objc::{sel, sel_impl};

    unsafe {
        let app = NSApp();
        // NSApplicationActivationPolicyAccessory = 1 (no dock icon)
        let _: () = objc::msg_send![app, setActivationPolicy: 1_isize];
    }
}

#[cfg(not(target_os = "macos"))]
fn setup_macos_accessory() {}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Layer Monitor");

    // Load configuration and fail fast on values the monitor cannot run with
    let config = Config::load()?;
    config.validate().context("Invalid configuration")?;
    info!("Configuration loaded");

    setup_macos_accessory();

    // Create event channel
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    // Create event loop (required for tray on macOS; must be on main thread)
    let event_loop = EventLoop::new()?;

    // Create EventSender that wraps the channel + event loop proxy for wake-up
    let proxy = event_loop.create_proxy();
    let event_sender = EventSender::new(event_tx, proxy);

    // The monitor thread owns the HID handle; the tray only ever sees
    // published snapshots arriving over the channel.
    let mut publisher = StatePublisher::new();
    publisher.attach(event_sender.clone());

    let filter = DeviceFilter {
        vendor_id: config.device.vendor_id,
        product_id: config.device.product_id,
        usage_page: config.device.usage_page,
        usage_id: config.device.usage_id,
    };
    let monitor = hid::monitor::spawn(filter, config.monitor.clone(), publisher);

    // Run event loop
    let mut app = App::new(event_sender, event_rx, monitor);
    event_loop.run_app(&mut app)?;

    Ok(())
}
