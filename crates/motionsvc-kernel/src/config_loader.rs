//! Tolerant JSON loading of device and graph configuration.
//!
//! A missing or unreadable file is not fatal: the caller gets an empty
//! collection and a warning in the log.  Within a readable device file each
//! entry is decoded on its own, so one malformed device (unknown class,
//! missing id) does not take the others down with it.

use std::collections::HashSet;
use std::path::Path;

use motionsvc_types::{DeviceConfig, GraphCollection, MotionError};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

/// The device file may be a bare array or an object wrapping one.
#[derive(Deserialize)]
#[serde(untagged)]
enum DeviceFile {
    List(Vec<Value>),
    Wrapped { devices: Vec<Value> },
}

/// Decode a device list from JSON text.
///
/// Entries that fail to decode, have an empty id, or repeat an id seen
/// earlier in the file are logged and skipped.
pub fn parse_devices(json: &str) -> Result<Vec<DeviceConfig>, MotionError> {
    let file: DeviceFile = serde_json::from_str(json)
        .map_err(|e| MotionError::Config(format!("device file: {e}")))?;
    let entries = match file {
        DeviceFile::List(entries) | DeviceFile::Wrapped { devices: entries } => entries,
    };

    let mut seen = HashSet::new();
    let mut devices = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let device: DeviceConfig = match serde_json::from_value(entry) {
            Ok(device) => device,
            Err(e) => {
                warn!(index, error = %e, "skipping malformed device entry");
                continue;
            }
        };
        if device.id.trim().is_empty() {
            warn!(index, "skipping device entry with empty id");
            continue;
        }
        if !seen.insert(device.id.clone()) {
            warn!(index, device = %device.id, "skipping duplicate device id");
            continue;
        }
        devices.push(normalize(device));
    }
    Ok(devices)
}

/// Load the device list from `path`, degrading to an empty list.
pub fn load_devices(path: &Path) -> Vec<DeviceConfig> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "device configuration unavailable");
            return Vec::new();
        }
    };
    match parse_devices(&text) {
        Ok(devices) => {
            info!(path = %path.display(), count = devices.len(), "loaded device configuration");
            devices
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "device configuration unreadable");
            Vec::new()
        }
    }
}

/// Decode a graph collection (graph id → definition) from JSON text.
pub fn parse_graphs(json: &str) -> Result<GraphCollection, MotionError> {
    serde_json::from_str(json).map_err(|e| MotionError::Config(format!("graph file: {e}")))
}

/// Load the graph collection from `path`, degrading to an empty collection.
pub fn load_graphs(path: &Path) -> GraphCollection {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "graph configuration unavailable");
            return GraphCollection::new();
        }
    };
    match parse_graphs(&text) {
        Ok(graphs) => {
            info!(path = %path.display(), count = graphs.len(), "loaded routing graphs");
            graphs
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "graph configuration unreadable");
            GraphCollection::new()
        }
    }
}

/// Project configured positions onto the axes the device actually has.
fn normalize(mut device: DeviceConfig) -> DeviceConfig {
    let class = device.device_class;
    for position in device.positions.values_mut() {
        *position = position.for_class(class);
    }
    device
}
