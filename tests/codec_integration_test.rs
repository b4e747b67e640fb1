//! End-to-end tests through the public facade

use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use cotguard::cot::detail::{Contact, Remarks};
use cotguard::{
    Codec, CodecConfig, CotError, DecodeError, EventBuilder, LimitKind, TypeError,
    ValidationError,
};
use std::io::Write;
use tempfile::NamedTempFile;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 10, 31, 0).unwrap()
}

fn site_event(event_type: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<event version="2.0" uid="SITE-0001" type="{event_type}" time="2024-01-15T10:30:00Z" start="2024-01-15T10:30:00Z" stale="2024-01-15T10:35:00Z" how="m-x">
    <point lat="48.8584" lon="2.2945" hae="35.0" ce="4.0" le="2.0"/>
    <detail><contact callsign="Eiffel"/></detail>
</event>"#
    )
}

#[test]
fn test_global_decode_of_fresh_event() -> Result<()> {
    init_tracing();

    let event = EventBuilder::new("ANDROID-12345678", "a-f-G-U-C", 37.7749, -122.4194, 100.0)
        .how("h-e")
        .contact(Contact::new("Bravo-2"))
        .extension(Remarks::new("on station"))
        .build()?;

    let xml = cotguard::encode(&event)?;
    let decoded = cotguard::decode(xml.as_bytes())?;
    assert_eq!(decoded, event);
    assert_eq!(decoded.callsign(), Some("Bravo-2"));
    Ok(())
}

#[test]
fn test_codec_from_yaml_file_with_extra_dataset() -> Result<()> {
    init_tracing();

    let mut dataset = NamedTempFile::new()?;
    write!(
        dataset,
        r#"<?xml version="1.0"?>
<types source="site">
  <cot cot="a-.-G-I-X-Q" full="Gnd/Installation/Site/Quarry" desc="Quarry"/>
  <how value="m-x" desc="machine/site survey"/>
</types>"#
    )?;

    let mut config_file = NamedTempFile::new()?;
    write!(
        config_file,
        "limits:\n  max_depth: 8\nvalidation:\n  min_stale_offset: 10\ncatalog:\n  extra_sources:\n    - {}\n",
        dataset.path().display()
    )?;

    let config = CodecConfig::from_file(config_file.path())?;
    assert_eq!(config.limits.max_depth, 8);

    let codec = Codec::from_config(&config)?;
    assert_eq!(codec.limits().max_depth(), 8);
    assert!(codec.catalog().contains("a-h-G-I-X-Q"));

    let event = codec.decode_at(site_event("a-f-G-I-X-Q").as_bytes(), now())?;
    assert_eq!(event.callsign(), Some("Eiffel"));

    // The site dataset is private to the configured codec.
    let err = Codec::new()
        .decode_at(site_event("a-f-G-I-X-Q").as_bytes(), now())
        .unwrap_err();
    assert!(matches!(
        err,
        DecodeError::Validation(ValidationError::Type(TypeError::Unknown(_)))
    ));
    Ok(())
}

#[test]
fn test_codec_config_policy_applies() -> Result<()> {
    let config = CodecConfig::from_yaml("validation:\n  min_stale_offset: 600\n")?;
    let codec = Codec::from_config(&config)?;

    let err = codec
        .decode_at(site_event("a-f-G").replace("m-x", "m-g").as_bytes(), now())
        .unwrap_err();
    assert!(matches!(
        err,
        DecodeError::Validation(ValidationError::StaleTooSoon { min_ms: 600_000, .. })
    ));
    Ok(())
}

#[test]
fn test_config_builder_environment_override() -> Result<()> {
    let mut config_file = tempfile::Builder::new().suffix(".yaml").tempfile()?;
    writeln!(config_file, "limits:\n  max_element_count: 500")?;

    std::env::set_var("COTGUARD__LIMITS__MAX_TOKEN_LEN", "2048");
    let config = CodecConfig::from_config_builder(config_file.path());
    std::env::remove_var("COTGUARD__LIMITS__MAX_TOKEN_LEN");
    let config = config?;

    assert_eq!(config.limits.max_element_count, 500);
    assert_eq!(config.limits.max_token_len, 2048);
    Ok(())
}

#[test]
fn test_invalid_configuration_rejected() {
    let config = CodecConfig::from_yaml("limits:\n  max_token_len: 4\n").unwrap();
    assert!(matches!(
        Codec::from_config(&config),
        Err(CotError::Config(_))
    ));

    assert!(matches!(
        CodecConfig::from_file("/nonexistent/cotguard.yaml"),
        Err(CotError::Config(_))
    ));
}

#[test]
fn test_errors_serialize_for_reporting() -> Result<()> {
    let codec = Codec::new();
    let err = codec
        .parse(br#"<?xml version="1.0"?><!DOCTYPE x><event/>"#)
        .unwrap_err();
    let json = serde_json::to_string(&err)?;
    assert!(json.contains("DoctypeRejected"));

    let limit = DecodeError::LimitExceeded {
        limit: LimitKind::Depth,
        max: 32,
        actual: 33,
    };
    let back: DecodeError = serde_json::from_str(&serde_json::to_string(&limit)?)?;
    assert_eq!(back, limit);
    Ok(())
}

#[test]
fn test_pooled_paths_match_plain_paths() -> Result<()> {
    let codec = Codec::new();
    let event = EventBuilder::new("ANDROID-1", "a-f-G", 1.0, 2.0, 3.0)
        .time(now())
        .stale_after(Duration::minutes(1))
        .build_at(now())?;

    let plain = codec.encode(&event)?;
    let pooled = codec.encode_pooled(&event)?;
    assert_eq!(&pooled[..], plain.as_bytes());

    let decoded = codec.decode_pooled_at(&pooled, now())?;
    assert_eq!(*decoded, event);
    Ok(())
}
