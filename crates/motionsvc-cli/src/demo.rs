//! Starter cell written by the first-run wizard: two hexapods and a gantry on
//! the simulated bench, with a routing graph for each.

use std::fs;
use std::path::PathBuf;

use crate::config::DataFiles;

const DEVICES: &str = r#"[
  {
    "id": "hexapod-left",
    "name": "Hexapod Left",
    "deviceClass": "Hexapod",
    "address": "127.0.0.1",
    "port": 50001,
    "positions": {
      "Home":     { "X": 0.0, "Y": 0.0, "Z": 0.0 },
      "Approach": { "X": 5.0, "Y": 0.0, "Z": 2.0 },
      "LensGrip": { "X": 5.0, "Y": 1.5, "Z": 0.5, "U": 0.2 }
    }
  },
  {
    "id": "hexapod-right",
    "name": "Hexapod Right",
    "deviceClass": "Hexapod",
    "address": "127.0.0.1",
    "port": 50002,
    "positions": {
      "Home":     { "X": 0.0, "Y": 0.0, "Z": 0.0 },
      "Approach": { "X": -5.0, "Y": 0.0, "Z": 2.0 },
      "LensGrip": { "X": -5.0, "Y": 1.5, "Z": 0.5, "U": -0.2 }
    }
  },
  {
    "id": "gantry",
    "name": "Gantry",
    "deviceClass": "Gantry",
    "address": "127.0.0.1",
    "port": 50010,
    "positions": {
      "Home":    { "X": 0.0, "Y": 0.0, "Z": 0.0 },
      "Inspect": { "X": 60.0, "Y": 40.0, "Z": 10.0 },
      "Load":    { "X": 120.0, "Y": 0.0, "Z": 0.0 }
    }
  }
]
"#;

const GRAPHS: &str = r#"{
  "HexapodLeft": {
    "nodes": ["Home", "Approach", "LensGrip"],
    "edges": [
      { "from": "Home", "to": "Approach", "weight": 1.0 },
      { "from": "Approach", "to": "LensGrip", "weight": 1.0 },
      { "from": "Home", "to": "LensGrip", "weight": 5.0 }
    ]
  },
  "HexapodRight": {
    "nodes": ["Home", "Approach", "LensGrip"],
    "edges": [
      { "from": "Home", "to": "Approach", "weight": 1.0 },
      { "from": "Approach", "to": "LensGrip", "weight": 1.0 },
      { "from": "Home", "to": "LensGrip", "weight": 5.0 }
    ]
  },
  "Gantry": {
    "nodes": ["Home", "Inspect", "Load"],
    "edges": [
      { "from": "Home", "to": "Inspect", "weight": 1.0 },
      { "from": "Inspect", "to": "Load", "weight": 1.0 },
      { "from": "Home", "to": "Load", "weight": 3.0 }
    ]
  }
}
"#;

/// Write the starter device and graph files where they do not exist yet.
/// Returns the files that were written.
pub fn seed_missing(files: &DataFiles) -> Result<Vec<PathBuf>, String> {
    let mut written = Vec::new();
    for (path, contents) in [(&files.devices, DEVICES), (&files.graphs, GRAPHS)] {
        if path.exists() {
            continue;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
        }
        fs::write(path, contents)
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
        written.push(path.clone());
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use motionsvc_kernel::config_loader::{parse_devices, parse_graphs};
    use motionsvc_types::DeviceClass;

    #[test]
    fn starter_files_parse() {
        let devices = parse_devices(DEVICES).unwrap();
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[2].device_class, DeviceClass::Gantry);
        assert!(devices.iter().all(|d| d.positions.contains_key("Home")));

        let graphs = parse_graphs(GRAPHS).unwrap();
        assert_eq!(graphs.len(), 3);
        assert!(graphs.contains_key("HexapodLeft"));
    }

    #[test]
    fn existing_files_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let files = Config::default().data_files(dir.path());
        fs::write(&files.graphs, "{}").unwrap();

        let written = seed_missing(&files).unwrap();
        assert_eq!(written, vec![files.devices.clone()]);
        assert_eq!(fs::read_to_string(&files.graphs).unwrap(), "{}");
        assert!(seed_missing(&files).unwrap().is_empty());
    }
}
