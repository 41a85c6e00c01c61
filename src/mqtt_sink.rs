//! Message-bus sink backed by `rumqttc`.
//!
//! Connects once, hands the connection's event loop to a background
//! thread that just logs what comes back, and publishes from the
//! foreground through a client handle.

use log::{info, warn};
use rumqttc::{Client, MqttOptions, QoS};

use crate::error::EngineError;
use crate::measurement::MeasurementRecord;
use crate::sink::Sink;

pub struct MqttSink {
    client: Client,
    topic_prefix: String,
}

impl MqttSink {
    pub fn connect(
        host: &str,
        port: u16,
        client_id: &str,
        user: Option<&str>,
        password: Option<&str>,
        topic_prefix: &str,
    ) -> Result<Self, EngineError> {
        let mut opts = MqttOptions::new(client_id, host, port);
        opts.set_keep_alive(std::time::Duration::from_secs(30));
        if let (Some(u), Some(p)) = (user, password) {
            opts.set_credentials(u, p);
        }

        let (client, mut connection) = Client::new(opts, 16);

        std::thread::spawn(move || {
            info!("mqtt connection loop starting");
            for notification in connection.iter() {
                match notification {
                    Ok(event) => info!("mqtt event: {:?}", event),
                    Err(e) => warn!("mqtt connection error: {}", e),
                }
            }
            info!("mqtt connection loop exit");
        });

        Ok(MqttSink {
            client,
            topic_prefix: topic_prefix.to_string(),
        })
    }

    fn publish_field(&mut self, topic: &str, value: f64) -> Result<(), EngineError> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, format!("{}", value))
            .map_err(|e| EngineError::SinkFailure(e.to_string()))
    }
}

impl Sink for MqttSink {
    fn publish(&mut self, record: &MeasurementRecord) -> Result<(), EngineError> {
        let base = format!("{}/{}", self.topic_prefix, record.inverter_serial);

        let ac = &record.ac;
        let ac_fields: &[(&str, Option<f64>)] = &[
            ("voltage", ac.voltage),
            ("current", ac.current),
            ("frequency", ac.frequency),
            ("power", ac.power),
            ("temperature", ac.temperature),
            ("load_pct", ac.load_pct),
        ];
        for (name, value) in ac_fields {
            if let Some(v) = value {
                self.publish_field(&format!("{}/ac/{}", base, name), *v)?;
            }
        }

        for (i, s) in record.per_string.iter().enumerate() {
            let section = format!("dc{}", i + 1);
            let fields: &[(&str, Option<f64>)] = &[
                ("voltage", s.voltage),
                ("current", s.current),
                ("power", s.power),
                ("energy_today", s.energy_today),
                ("energy_total", s.energy_total),
            ];
            for (name, value) in fields {
                if let Some(v) = value {
                    self.publish_field(&format!("{}/{}/{}", base, section, name), *v)?;
                }
            }
        }

        Ok(())
    }
}
