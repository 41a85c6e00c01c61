//! INI configuration file loading, grounded on the `configparser` crate.

use configparser::ini::Ini;

use crate::error::EngineError;

#[derive(Debug, Clone, Default)]
pub struct MqttConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FileConfig {
    pub mqtt: MqttConfig,
    pub dtu_serial: String,
    pub inverter_serials: Vec<String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        FileConfig {
            mqtt: MqttConfig::default(),
            dtu_serial: "99978563412".to_string(),
            inverter_serials: Vec::new(),
        }
    }
}

/// Loads `[mqtt]`, `[dtu]`, `[inverter]` sections from an INI file at
/// `path`. A missing file is not an error here — callers fall back to
/// `FileConfig::default()` plus CLI flags, since every field is optional.
pub fn load(path: &str) -> Result<FileConfig, EngineError> {
    let mut ini = Ini::new();
    let mut cfg = FileConfig::default();

    let map = match ini.load(path) {
        Ok(map) => map,
        Err(_) => return Ok(cfg),
    };
    let _ = map;

    cfg.mqtt.host = ini.get("mqtt", "host");
    cfg.mqtt.port = ini.getuint("mqtt", "port").ok().flatten().map(|v| v as u16);
    cfg.mqtt.user = ini.get("mqtt", "user");
    cfg.mqtt.password = ini.get("mqtt", "password");

    if let Some(serial) = ini.get("dtu", "serial") {
        cfg.dtu_serial = serial;
    }

    if let Some(list) = ini.get("inverter", "serial") {
        cfg.inverter_serials = list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = load("/nonexistent/ahoy.conf").unwrap();
        assert_eq!(cfg.dtu_serial, "99978563412");
        assert!(cfg.inverter_serials.is_empty());
    }

    #[test]
    fn parses_sections_from_disk() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("ahoy_conf_test_{}.ini", std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "[mqtt]\nhost=broker.local\nport=1883\nuser=ahoy\npassword=secret\n\n[dtu]\nserial=199978563412\n\n[inverter]\nserial=114199978563412, 116199978563413"
        )
        .unwrap();

        let cfg = load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.mqtt.host.as_deref(), Some("broker.local"));
        assert_eq!(cfg.mqtt.port, Some(1883));
        assert_eq!(cfg.dtu_serial, "199978563412");
        assert_eq!(
            cfg.inverter_serials,
            vec!["114199978563412".to_string(), "116199978563413".to_string()]
        );

        let _ = std::fs::remove_file(&path);
    }
}
