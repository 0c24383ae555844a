//! Report generation
//!
//! Aggregates decoded events into a PGN statistics table and a device
//! directory built from Product Information messages.

use n2k_decoder::{DecodedEvent, DecodedMessage};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

/// Product Information
pub const PRODUCT_INFORMATION_PGN: u32 = 126996;

/// Message count for one PGN
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PgnCount {
    pub pgn: u32,
    pub description: String,
    pub count: usize,
}

/// Identity of one node on the bus
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub address: u8,
    pub product_code: Option<f64>,
    pub model_id: Option<String>,
    pub software_version: Option<String>,
    pub model_version: Option<String>,
    pub serial_code: Option<String>,
}

/// Count messages per PGN, most frequent first
///
/// The description comes from the first message seen for the PGN.
pub fn pgn_statistics(events: &[DecodedEvent]) -> Vec<PgnCount> {
    let mut counts: HashMap<u32, PgnCount> = HashMap::new();

    for event in events {
        let pgn = event.header().pgn;
        counts
            .entry(pgn)
            .or_insert_with(|| PgnCount {
                pgn,
                description: event.description().to_string(),
                count: 0,
            })
            .count += 1;
    }

    let mut stats: Vec<PgnCount> = counts.into_values().collect();
    stats.sort_by(|a, b| b.count.cmp(&a.count).then(a.pgn.cmp(&b.pgn)));
    stats
}

/// Device directory keyed by source address; the first report per address wins
pub fn device_directory(events: &[DecodedEvent]) -> BTreeMap<u8, DeviceInfo> {
    let mut devices = BTreeMap::new();

    for event in events {
        let DecodedEvent::Message { header, message, .. } = event else {
            continue;
        };
        if header.pgn != PRODUCT_INFORMATION_PGN {
            continue;
        }

        devices.entry(header.source).or_insert_with(|| {
            log::debug!("Device at address {}: {:?}", header.source, text(message, "Model ID"));
            DeviceInfo {
                address: header.source,
                product_code: message.field("Product Code").and_then(|f| f.value.as_f64()),
                model_id: text(message, "Model ID"),
                software_version: text(message, "Software Version Code"),
                model_version: text(message, "Model Version"),
                serial_code: text(message, "Model Serial Code"),
            }
        });
    }

    devices
}

fn text(message: &DecodedMessage, name: &str) -> Option<String> {
    message.field(name).map(|f| f.value.to_string())
}

/// Plain text table of PGN counts
pub fn render_statistics(stats: &[PgnCount]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:>7}  {:>8}  Description", "PGN", "Count");
    for entry in stats {
        let _ = writeln!(out, "{:>7}  {:>8}  {}", entry.pgn, entry.count, entry.description);
    }
    out
}

/// Plain text table of devices
pub fn render_devices(devices: &BTreeMap<u8, DeviceInfo>) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>4}  {:>8}  {:<24} {:<16} {:<16} Serial",
        "Addr", "Product", "Model", "Software", "Version"
    );
    for device in devices.values() {
        let _ = writeln!(
            out,
            "{:>4}  {:>8}  {:<24} {:<16} {:<16} {}",
            device.address,
            device.product_code.map(|c| c.to_string()).unwrap_or_default(),
            device.model_id.as_deref().unwrap_or("-"),
            device.software_version.as_deref().unwrap_or("-"),
            device.model_version.as_deref().unwrap_or("-"),
            device.serial_code.as_deref().unwrap_or("-"),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use n2k_decoder::{DecodedField, FieldValue, MessageHeader, PacketType, PgnDictionary, Transport};

    fn header(pgn: u32, source: u8) -> MessageHeader {
        MessageHeader {
            timestamp: None,
            priority: 6,
            pgn,
            source,
            destination: 255,
            payload: vec![0],
            transport: Transport::Fast,
        }
    }

    fn product_info(source: u8, model: &str) -> DecodedEvent {
        let dictionary = PgnDictionary::from_json_str(
            r#"{"PGNs": [{"PGN": 126996, "Id": "productInformation", "Description": "Product Information", "Type": "Fast", "Fields": []}]}"#,
        )
        .unwrap();
        let (handle, _) = dictionary.definitions().next().unwrap();

        let field = |name: &str, value: FieldValue| DecodedField {
            name: name.to_string(),
            value,
            unit: None,
        };

        DecodedEvent::Message {
            header: header(PRODUCT_INFORMATION_PGN, source),
            definition: handle,
            message: DecodedMessage {
                pgn: PRODUCT_INFORMATION_PGN,
                id: "productInformation".to_string(),
                description: "Product Information".to_string(),
                packet_type: PacketType::Fast,
                fields: vec![
                    field("Product Code", FieldValue::Number(1234.0)),
                    field("Model ID", FieldValue::Text(model.to_string())),
                    field("Software Version Code", FieldValue::Text("2.1".to_string())),
                    field("Model Serial Code", FieldValue::Text("0042".to_string())),
                ],
                repeated_groups: Vec::new(),
                errors: Vec::new(),
            },
        }
    }

    #[test]
    fn test_pgn_statistics_sorted_by_count() {
        let events = vec![
            DecodedEvent::UnknownPgn { header: header(59904, 1) },
            product_info(3, "GPS 200"),
            DecodedEvent::UnknownPgn { header: header(59904, 2) },
        ];
        let stats = pgn_statistics(&events);

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].pgn, 59904);
        assert_eq!(stats[0].count, 2);
        assert_eq!(stats[0].description, "Unknown PGN");
        assert_eq!(stats[1].description, "Product Information");

        let table = render_statistics(&stats);
        assert!(table.contains("126996"));
    }

    #[test]
    fn test_device_directory_keeps_first_report() {
        let events = vec![product_info(3, "GPS 200"), product_info(3, "Other"), product_info(7, "Pilot")];
        let devices = device_directory(&events);

        assert_eq!(devices.len(), 2);
        let gps = &devices[&3];
        assert_eq!(gps.model_id.as_deref(), Some("GPS 200"));
        assert_eq!(gps.product_code, Some(1234.0));
        assert_eq!(gps.software_version.as_deref(), Some("2.1"));
        assert_eq!(gps.model_version, None);
        assert!(render_devices(&devices).contains("Pilot"));
    }
}
