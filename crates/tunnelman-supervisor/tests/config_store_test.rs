use tempfile::TempDir;
use tunnelman_supervisor::{RunnerConfig, RunnerConfigStore, SupervisorError};

#[test]
fn test_save_load_list_delete() {
    let dir = TempDir::new().unwrap();
    let store = RunnerConfigStore::new(dir.path().join("cloudflared"));

    // Missing directory lists as empty
    assert!(store.list().unwrap().is_empty());

    let blog = RunnerConfig::single_service(
        "11111111-2222",
        store.dir(),
        "blog.example.com",
        "http://localhost:4000",
    );
    let api = RunnerConfig::catch_all_only("33333333-4444", store.dir());

    let path = store.save("blog", &blog).unwrap();
    assert_eq!(path, store.dir().join("blog.yml"));
    store.save("api", &api).unwrap();
    std::fs::write(store.dir().join("notes.txt"), "ignored").unwrap();

    assert_eq!(store.list().unwrap(), vec!["api", "blog"]);
    assert_eq!(store.load("blog").unwrap(), blog);

    store.delete("blog").unwrap();
    store.delete("blog").unwrap();
    assert_eq!(store.list().unwrap(), vec!["api"]);
    assert!(matches!(
        store.load("blog"),
        Err(SupervisorError::ConfigFile { .. })
    ));
}

#[test]
fn test_written_file_uses_runner_keys() {
    let dir = TempDir::new().unwrap();
    let store = RunnerConfigStore::new(dir.path());

    let mut config = RunnerConfig::catch_all_only("abc", dir.path());
    config.no_autoupdate = true;
    config.protocol = Some("quic".to_string());
    let path = store.save("t1", &config).unwrap();

    let yaml = std::fs::read_to_string(path).unwrap();
    assert!(yaml.contains("tunnel: abc"));
    assert!(yaml.contains("credentials-file:"));
    assert!(yaml.contains("loglevel: info"));
    assert!(yaml.contains("no-autoupdate: true"));
    assert!(yaml.contains("protocol: quic"));
    assert!(yaml.contains("service: http_status:404"));
}

#[test]
fn test_rejects_unsafe_names() {
    let dir = TempDir::new().unwrap();
    let store = RunnerConfigStore::new(dir.path());
    let config = RunnerConfig::catch_all_only("abc", dir.path());

    assert!(matches!(
        store.save("../escape", &config),
        Err(SupervisorError::InvalidConfig(_))
    ));
}
