//! Configuration loading tests

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;
    use struttura::config::StrutturaConfig;

    #[test]
    fn defaults() {
        let config = StrutturaConfig::default();
        assert_eq!(config.store_dir, PathBuf::from("constructions"));
        assert_eq!(config.default_language, "en");
        assert_eq!(config.sync_retry_delay(), Duration::from_millis(500));
        assert_eq!(config.log_filter, "struttura=info");
    }

    #[test]
    fn toml_file_overrides_some_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("struttura.toml");
        std::fs::write(
            &path,
            "store_dir = \"/srv/constructions\"\nsync_retry_delay_ms = 50\n",
        )
        .unwrap();

        let config = StrutturaConfig::load(Some(&path)).unwrap();
        assert_eq!(config.store_dir, PathBuf::from("/srv/constructions"));
        assert_eq!(config.sync_retry_delay(), Duration::from_millis(50));
        assert_eq!(config.default_language, "en");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StrutturaConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
