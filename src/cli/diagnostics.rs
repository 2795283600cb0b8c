//! `diagnostics` and `enable-screensaver`: one-shot device commands

use std::sync::Arc;

use anyhow::bail;

use super::{split_address, AppContext, DeviceArgs};
use crate::device::{AdbDevice, ConnectStatus, DeviceBridge, DreamSettings};
use crate::host::CommandRunner;
use crate::settings::device_address;

/// What `enable-screensaver` changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnableReport {
    pub before: DreamSettings,
    pub component_set: bool,
}

/// Resolve the address and build an adb-backed device after the tool check
fn open_device(args: &DeviceArgs, ctx: &AppContext) -> anyhow::Result<(String, AdbDevice)> {
    ctx.tools.validate()?;
    let (host, port) = match &args.address {
        Some(address) => split_address(address),
        None => ctx.settings.load().host_and_port(),
    };
    let address = device_address(&host, &port)?;
    let device = AdbDevice::new(
        Arc::new(CommandRunner::new(ctx.tools.clone())),
        ctx.tools.command_timeout,
    );
    Ok((address, device))
}

async fn connect(device: &dyn DeviceBridge, address: &str) -> anyhow::Result<()> {
    let result = device.connect(address).await;
    if !result.success {
        bail!("Connect failed: {}", result.error_text("no output"));
    }
    if ConnectStatus::classify(&result.stdout) == ConnectStatus::Unrecognized {
        tracing::warn!("Connect response: {}", result.stdout);
    } else {
        tracing::info!("Connected: {}", result.stdout);
    }
    Ok(())
}

/// Connect and read the screensaver settings
pub async fn read_settings(
    device: &dyn DeviceBridge,
    address: &str,
) -> anyhow::Result<DreamSettings> {
    connect(device, address).await?;
    let result = device.diagnostics().await;
    if !result.success {
        bail!(
            "Reading screensaver settings failed: {}",
            result.error_text("no output")
        );
    }
    Ok(DreamSettings::from_output(&result.stdout))
}

/// Enable the screensaver, then set the component only if the device has none
pub async fn enable_screensaver(
    device: &dyn DeviceBridge,
    address: &str,
) -> anyhow::Result<EnableReport> {
    let before = read_settings(device, address).await?;

    let enable = device.enable_dream().await;
    if !enable.success {
        bail!(
            "Enabling the screensaver failed: {}",
            enable.error_text("no output")
        );
    }

    let component_set = before.component_missing();
    if component_set {
        let set = device.set_screensaver_component().await;
        if !set.success {
            bail!(
                "Setting the screensaver component failed: {}",
                set.error_text("no output")
            );
        }
    }

    Ok(EnableReport {
        before,
        component_set,
    })
}

fn print_settings(settings: &DreamSettings) {
    for (name, value) in settings.rows() {
        let shown = if value.is_empty() { "(unset)" } else { value };
        println!("  {:<32}{}", name, shown);
    }
}

pub async fn run(args: DeviceArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let (address, device) = open_device(&args, ctx)?;
    let settings = read_settings(&device, &address).await?;
    println!("Screensaver settings on {}:", address);
    print_settings(&settings);
    Ok(())
}

pub async fn run_enable(args: DeviceArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let (address, device) = open_device(&args, ctx)?;
    let report = enable_screensaver(&device, &address).await?;
    println!("Screensaver enabled on {}.", address);
    if report.component_set {
        println!("Screensaver component was missing and has been set.");
    } else {
        println!(
            "Screensaver component left as {}.",
            report.before.screensaver_components
        );
    }
    Ok(())
}
