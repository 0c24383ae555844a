//! End-to-end decoding through the public API

use n2k_decoder::{
    CanFrame, DecodedEvent, Decoder, DecoderConfig, DecoderError, FieldError, FieldValue,
    MessageDecoder, PgnDictionary, Transport,
};

const DOCUMENT: &str = r#"{
    "LookupEnumerations": [
        {"Name": "INDUSTRY_CODE", "EnumValues": [{"Name": "Marine Industry", "Value": 4}]},
        {"Name": "MANUFACTURER_CODE", "EnumValues": [
            {"Name": "Furuno", "Value": 1855},
            {"Name": "Simrad", "Value": 1857}
        ]}
    ],
    "LookupIndirectEnumerations": [
        {"Name": "DEVICE_FUNCTION", "EnumValues": [{"Name": "Autopilot", "Value1": 40, "Value2": 150}]}
    ],
    "PGNs": [
        {
            "PGN": 65280, "Id": "furunoHeave", "Description": "Furuno: Heave", "Type": "Single", "Length": 8,
            "Fields": [
                {"Order": 1, "Name": "Manufacturer Code", "BitOffset": 0, "BitLength": 11,
                 "FieldType": "LOOKUP", "LookupEnumeration": "MANUFACTURER_CODE", "Match": 1855},
                {"Order": 2, "Name": "Reserved", "BitOffset": 11, "BitLength": 2, "FieldType": "RESERVED"},
                {"Order": 3, "Name": "Industry Code", "BitOffset": 13, "BitLength": 3,
                 "FieldType": "LOOKUP", "LookupEnumeration": "INDUSTRY_CODE", "Match": 4},
                {"Order": 4, "Name": "Heave", "BitOffset": 16, "BitLength": 32, "FieldType": "NUMBER",
                 "Signed": true, "Resolution": 0.001, "Unit": "m"}
            ]
        },
        {
            "PGN": 65280, "Id": "simnetHeave", "Description": "Simnet: Heave", "Type": "Single", "Length": 8,
            "Fields": [
                {"Order": 1, "Name": "Manufacturer Code", "BitOffset": 0, "BitLength": 11,
                 "FieldType": "LOOKUP", "LookupEnumeration": "MANUFACTURER_CODE", "Match": 1857},
                {"Order": 2, "Name": "Reserved", "BitOffset": 11, "BitLength": 2, "FieldType": "RESERVED"},
                {"Order": 3, "Name": "Industry Code", "BitOffset": 13, "BitLength": 3,
                 "FieldType": "LOOKUP", "LookupEnumeration": "INDUSTRY_CODE", "Match": 4},
                {"Order": 4, "Name": "Mode", "BitOffset": 16, "BitLength": 8, "FieldType": "NUMBER"}
            ]
        },
        {
            "PGN": 127251, "Id": "rateOfTurn", "Description": "Rate of Turn", "Type": "Single", "Length": 5,
            "Fields": [
                {"Order": 1, "Name": "SID", "BitOffset": 0, "BitLength": 8, "FieldType": "NUMBER"},
                {"Order": 2, "Name": "Rate", "BitOffset": 8, "BitLength": 8, "FieldType": "NUMBER", "Signed": true}
            ]
        },
        {
            "PGN": 126464, "Id": "pgnListTransmitAndReceive", "Description": "PGN List (Transmit and Receive)",
            "Type": "Fast", "Length": 10,
            "RepeatingFieldSet1Size": 2, "RepeatingFieldSet1StartField": 3, "RepeatingFieldSet1CountField": 2,
            "Fields": [
                {"Order": 1, "Name": "Function Code", "BitOffset": 0, "BitLength": 8, "FieldType": "NUMBER"},
                {"Order": 2, "Name": "Count", "BitOffset": 8, "BitLength": 8, "FieldType": "NUMBER"},
                {"Order": 3, "Name": "Id", "BitOffset": 16, "BitLength": 8, "FieldType": "NUMBER"},
                {"Order": 4, "Name": "Value", "BitOffset": 24, "BitLength": 8, "FieldType": "NUMBER", "RangeMax": 200}
            ]
        },
        {
            "PGN": 126998, "Id": "configurationInformation", "Description": "Configuration Information",
            "Type": "Fast",
            "Fields": [
                {"Order": 1, "Name": "Installation Description #1", "BitOffset": 0, "BitLength": 64, "FieldType": "STRING_FIX"},
                {"Order": 2, "Name": "Class", "BitOffset": 64, "BitLength": 8, "FieldType": "NUMBER"},
                {"Order": 3, "Name": "Function", "BitOffset": 72, "BitLength": 8, "FieldType": "INDIRECT_LOOKUP",
                 "LookupIndirectEnumeration": "DEVICE_FUNCTION", "LookupIndirectEnumerationFieldOrder": 2}
            ]
        },
        {
            "PGN": 130306, "Id": "windData", "Description": "Wind Data", "Type": "Single", "Length": 6,
            "Fields": [
                {"Order": 1, "Name": "SID", "BitOffset": 0, "BitLength": 8, "FieldType": "NUMBER"},
                {"Order": 2, "Name": "Blob", "BitOffset": 8, "BitLength": 16, "FieldType": "VARIABLE"},
                {"Order": 3, "Name": "Wind Speed", "BitOffset": 24, "BitLength": 16, "FieldType": "NUMBER",
                 "Resolution": 0.01, "Unit": "m/s"}
            ]
        }
    ]
}"#;

fn dictionary() -> PgnDictionary {
    let _ = env_logger::builder().is_test(true).try_init();
    PgnDictionary::from_json_str(DOCUMENT).unwrap()
}

fn message_decoder(convert_units: bool) -> MessageDecoder {
    MessageDecoder::new(dictionary().into_handle(), convert_units)
}

fn frame(pgn: u32, data: &[u8]) -> CanFrame {
    CanFrame {
        priority: 6,
        pgn,
        source: 35,
        destination: 255,
        data: data.to_vec(),
        timestamp: Some("2024-03-01T10:00:00.000".to_string()),
    }
}

#[test]
fn sign_extension_follows_field_width() {
    let decoder = message_decoder(true);

    let negative = decoder.decode_payload(127251, &[0x00, 0xFF]).unwrap();
    assert_eq!(negative.field("Rate").unwrap().value, FieldValue::Number(-1.0));

    let positive = decoder.decode_payload(127251, &[0x00, 0x7F]).unwrap();
    assert_eq!(positive.field("Rate").unwrap().value, FieldValue::Number(127.0));
}

#[test]
fn shared_pgn_picks_the_matching_variant() {
    let dictionary = dictionary();
    assert_eq!(dictionary.candidates(65280).len(), 2);
    assert_eq!(dictionary.patterns(65280).len(), 2);

    // Simrad (1857 = 0x741), reserved bits set, industry code 4
    let payload = [0x41, 0x9F, 0x02, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
    let decoder = MessageDecoder::new(dictionary.into_handle(), true);
    let message = decoder.decode_payload(65280, &payload).unwrap();

    assert_eq!(message.id, "simnetHeave");
    assert_eq!(
        message.field("Manufacturer Code").unwrap().value,
        FieldValue::Label("Simrad".to_string())
    );
    assert_eq!(
        message.field("Industry Code").unwrap().value,
        FieldValue::Label("Marine Industry".to_string())
    );
    assert_eq!(message.field("Mode").unwrap().value, FieldValue::Number(2.0));
    assert!(message.field("Reserved").is_none());
}

#[test]
fn shared_pgn_without_matching_variant() {
    let mut decoder = Decoder::new(dictionary().into_handle(), DecoderConfig::new());

    // Manufacturer 0x123 is neither variant
    let event = decoder.decode_frame(frame(65280, &[0x23, 0x81, 0, 0, 0, 0, 0, 0])).unwrap();
    assert_eq!(event.description(), "No pattern match");
    let DecodedEvent::NoPatternMatch { message, .. } = &event else {
        panic!("expected no pattern match, got {:?}", event);
    };
    assert_eq!(message.id, "furunoHeave");
    assert!(message.fields.is_empty());

    let direct = message_decoder(true).decode_payload(65280, &[0x23, 0x81]);
    assert!(matches!(direct, Err(DecoderError::NoPatternMatch(65280))));
}

#[test]
fn repeating_set_emits_declared_count() {
    let decoder = message_decoder(true);

    // Count = 3 followed by more bytes than three groups need
    let payload = [0x00, 0x03, 10, 20, 30, 250, 40, 50, 60, 70];
    let message = decoder.decode_payload(126464, &payload).unwrap();

    assert_eq!(message.fields.len(), 2);
    assert_eq!(message.repeated_groups.len(), 3);
    // Each repetition is range filtered on its own: the third Value is 250
    let sizes: Vec<usize> = message.repeated_groups.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
}

#[test]
fn decoding_is_idempotent() {
    let decoder = message_decoder(true);
    let payload = [0x3F, 0x9F, 0x10, 0x27, 0x00, 0x00, 0xFF, 0xFF];

    let first = decoder.decode_payload(65280, &payload).unwrap();
    let second = decoder.decode_payload(65280, &payload).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.id, "furunoHeave");
    assert_eq!(first.field("Heave").unwrap().value, FieldValue::Text("10.00 m".to_string()));
}

#[test]
fn unsupported_field_fails_alone() {
    let decoder = message_decoder(true);
    let message = decoder
        .decode_payload(130306, &[0x01, 0xAA, 0xBB, 0xE8, 0x03, 0xFF])
        .unwrap();

    assert_eq!(message.field("SID").unwrap().value, FieldValue::Number(1.0));
    assert_eq!(
        message.field("Wind Speed").unwrap().value,
        FieldValue::Text("19.44 kts".to_string())
    );
    assert_eq!(
        message.errors,
        vec![FieldError::UnsupportedFieldType {
            field: "Blob".to_string(),
            type_name: "VARIABLE".to_string()
        }]
    );
}

#[test]
fn fast_packet_frames_are_reassembled_then_decoded() {
    let mut decoder = Decoder::new(dictionary().into_handle(), DecoderConfig::new());

    let frames = vec![
        frame(126998, &[0x60, 0x0A, b'H', b'E', b'L', b'M', b'@', b'@']),
        frame(126998, &[0x61, 0x40, 0x40, 40, 150, 0xFF, 0xFF, 0xFF]),
    ];
    let events: Vec<DecodedEvent> = decoder.decode_frames(frames).collect();
    assert_eq!(events.len(), 1);

    let header = events[0].header();
    assert_eq!(header.transport, Transport::Fast);
    assert_eq!(header.payload.len(), 10);
    assert_eq!(header.timestamp.as_deref(), Some("2024-03-01T10:00:00.000"));

    let message = events[0].message().unwrap();
    assert_eq!(
        message.field("Installation Description #1").unwrap().value,
        FieldValue::Text("HELM".to_string())
    );
    assert_eq!(
        message.field("Function").unwrap().value,
        FieldValue::Label("Autopilot".to_string())
    );
    assert_eq!(decoder.open_conversations(), 0);
}

#[test]
fn unknown_pgn_passes_through() {
    let mut decoder = Decoder::new(dictionary().into_handle(), DecoderConfig::new());
    let event = decoder.decode_frame(frame(59392, &[0x01, 0x02, 0x03])).unwrap();

    assert!(matches!(event, DecodedEvent::UnknownPgn { .. }));
    assert_eq!(event.header().transport, Transport::Unknown);
    assert_eq!(event.header().payload_hex(), "01 02 03");
}

#[test]
fn decoded_message_serializes_to_json() {
    let decoder = message_decoder(false);
    let message = decoder.decode_payload(127251, &[0x07, 0xFE]).unwrap();
    let json = serde_json::to_value(&message).unwrap();

    assert_eq!(json["pgn"], 127251);
    assert_eq!(json["type"], "Single");
    assert_eq!(json["fields"][1]["name"], "Rate");
    assert_eq!(json["fields"][1]["value"], -2.0);
}
