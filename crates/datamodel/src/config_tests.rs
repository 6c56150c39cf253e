use super::*;
use tempfile::tempdir;

const MINIMAL: &str = r#"
[hermes]
app_name = "hermes-ldap"
state_dir = "/var/lib/hermes"

[hermes.socket]
path = "/run/hermes.sock"
"#;

#[test]
fn minimal_config_fills_in_defaults() {
    let cfg: HermesConfig = toml::from_str(MINIMAL).unwrap();
    assert_eq!(cfg.hermes.app_name, "hermes-ldap");
    assert_eq!(cfg.hermes.socket.mode, 0o700);
    assert_eq!(cfg.hermes.logs.verbosity, "info");
    assert_eq!(cfg.hermes.loop_cfg.interval_ms, 1_000);
    assert_eq!(cfg.hermes.error_queue.foreign_key_policy, ForeignKeyPolicy::Disabled);
    assert_eq!(cfg.hermes.cache.backup_count, 3);
    assert!(cfg.datamodel.is_empty());
}

#[test]
fn datamodel_section_parses_attrs_mapping() {
    let toml_src = format!(
        "{MINIMAL}\n[[datamodel]]\nlocal_type = \"User\"\nhermes_type = \"posixAccount\"\n\
         [datamodel.attrs_mapping]\nuid = \"uid\"\nfull_name = \"${{givenName}} ${{sn}}\"\n"
    );
    let cfg: HermesConfig = toml::from_str(&toml_src).unwrap();
    assert_eq!(cfg.datamodel.len(), 1);
    let dm = &cfg.datamodel[0];
    assert_eq!(dm.hermes_type, "posixAccount");
    assert_eq!(dm.attrs_mapping["full_name"], "${givenName} ${sn}");
}

#[test]
fn load_reports_io_error_for_missing_file() {
    let dir = tempdir().unwrap();
    let err = HermesConfig::load(&dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, MappingError::ConfigIo { .. }));
}

#[test]
fn load_reports_parse_error_for_invalid_toml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "not valid = [").unwrap();
    let err = HermesConfig::load(&path).unwrap_err();
    assert!(matches!(err, MappingError::ConfigParse { .. }));
}
