//! Integration tests for jobcache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn jobcache() -> Command {
        let mut cmd = cargo_bin_cmd!("jobcache");
        cmd.env_remove("JOBCACHE_CONFIG")
            .env_remove("JOBCACHE_JOB")
            .env_remove("JOBCACHE_WORKSPACE");
        cmd
    }

    /// Config with a store under `dir` and one directory cache for `deps`
    fn write_config(dir: &Path, extra: &str) -> std::path::PathBuf {
        let path = dir.join("config.toml");
        let config = format!(
            r#"
[general]
history = false

[store]
root = "{}"

[cache]
{}

[[cache.definitions]]
path = "deps"
"#,
            dir.join("store").display().to_string().replace('\\', "/"),
            extra
        );
        std::fs::write(&path, config).unwrap();
        path
    }

    fn cache_cmd(dir: &TempDir, config: &Path, args: &[&str]) -> Command {
        let mut cmd = jobcache();
        cmd.arg("--no-local")
            .arg("--config")
            .arg(config)
            .arg("--workspace")
            .arg(dir.path().join("ws"))
            .args(args);
        cmd
    }

    #[test]
    fn help_displays() {
        jobcache()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("persist build caches"));
    }

    #[test]
    fn version_displays() {
        jobcache()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("jobcache"));
    }

    #[test]
    fn config_path_honors_flag() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        jobcache()
            .args(["--no-local", "config", "path", "--config"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("custom.toml"));
    }

    #[test]
    fn config_show_prints_sections() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), "max_size_mb = 7");
        jobcache()
            .arg("--no-local")
            .arg("--config")
            .arg(&config)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[store]"))
            .stdout(predicate::str::contains("max_size_mb = 7"));
    }

    #[test]
    fn unknown_format_is_rejected_with_hint() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), "");
        cache_cmd(&dir, &config, &["save", "--job", "build", "--path", "out:rar"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("unknown storage format"));
    }

    #[test]
    fn save_then_restore_round_trip() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), "");
        let deps = dir.path().join("ws/deps");
        std::fs::create_dir_all(deps.join("nested")).unwrap();
        std::fs::write(deps.join("a.txt"), "0123456789").unwrap();
        std::fs::write(deps.join("nested/b.txt"), "abc").unwrap();

        cache_cmd(&dir, &config, &["save", "--job", "team/build"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Saved deps (2 uploaded)"));

        std::fs::remove_dir_all(&deps).unwrap();

        cache_cmd(&dir, &config, &["restore", "--job", "team/build"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Restored deps (2 files)"));
        assert_eq!(std::fs::read_to_string(deps.join("nested/b.txt")).unwrap(), "abc");
    }

    #[test]
    fn keys_lists_resolved_keys() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), "");
        cache_cmd(&dir, &config, &["keys", "--job", "team/build", "-p", "node_modules:zip"])
            .assert()
            .success()
            .stdout(predicate::str::contains("team/build/cache/deps"))
            .stdout(predicate::str::contains("team/build/cache/node_modules"));
    }

    #[cfg(unix)]
    #[test]
    fn run_saves_after_failed_command_and_keeps_exit_code() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), "");
        std::fs::create_dir_all(dir.path().join("ws")).unwrap();

        cache_cmd(
            &dir,
            &config,
            &[
                "run",
                "--job",
                "build",
                "--",
                "sh",
                "-c",
                "mkdir -p deps && echo out > deps/out.txt && exit 4",
            ],
        )
        .assert()
        .code(4)
        .stdout(predicate::str::contains("Saved deps (1 uploaded)"))
        .stderr(predicate::str::contains("Workload exited with code 4"));

        assert!(dir
            .path()
            .join("store/jobcache/build/cache/deps/out.txt")
            .is_file());
    }

    #[test]
    fn purge_with_yes_deletes_job() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), "");
        std::fs::create_dir_all(dir.path().join("ws/deps")).unwrap();
        std::fs::write(dir.path().join("ws/deps/a.txt"), "a").unwrap();

        cache_cmd(&dir, &config, &["save", "--job", "build"])
            .assert()
            .success();
        cache_cmd(&dir, &config, &["purge", "--job", "build", "--yes"])
            .assert()
            .success();
        assert!(!dir.path().join("store/jobcache/build").exists());
    }

    #[test]
    fn purge_without_yes_is_declined_in_ci() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), "");
        std::fs::create_dir_all(dir.path().join("ws/deps")).unwrap();
        std::fs::write(dir.path().join("ws/deps/a.txt"), "a").unwrap();

        cache_cmd(&dir, &config, &["save", "--job", "build"])
            .assert()
            .success();
        cache_cmd(&dir, &config, &["purge", "--job", "build"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Purge cancelled"));
        assert!(dir.path().join("store/jobcache/build").exists());
    }
}

mod engine_tests {
    use async_trait::async_trait;
    use filetime::FileTime;
    use jobcache::cache::{CacheDefinition, KeyResolver, StorageFormat};
    use jobcache::session::{CacheManager, CacheSettings, SaveOutcome};
    use jobcache::store::{list_all, FsStore, ListPage, ObjectMetadata, RemoteStore};
    use jobcache::JobCacheResult;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    /// FsStore that records how many puts overlap
    struct CountingStore {
        inner: FsStore,
        puts: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl CountingStore {
        fn new(root: PathBuf) -> Self {
            Self {
                inner: FsStore::new(root, "jobcache"),
                puts: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RemoteStore for CountingStore {
        async fn list(&self, prefix: &str, marker: Option<&str>) -> JobCacheResult<ListPage> {
            self.inner.list(prefix, marker).await
        }

        async fn put(&self, key: &str, local: &Path, metadata: &ObjectMetadata) -> JobCacheResult<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(3)).await;
            let result = self.inner.put(key, local, metadata).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.puts.fetch_add(1, Ordering::SeqCst);
            result
        }

        async fn get(&self, key: &str, local: &Path) -> JobCacheResult<()> {
            self.inner.get(key, local).await
        }

        async fn delete(&self, key: &str, recursive: bool) -> JobCacheResult<()> {
            self.inner.delete(key, recursive).await
        }

        fn describe(&self) -> String {
            self.inner.describe()
        }
    }

    struct Env {
        dir: TempDir,
        store: Arc<CountingStore>,
        manager: CacheManager,
    }

    impl Env {
        fn new(settings: CacheSettings) -> Self {
            let dir = TempDir::new().unwrap();
            let store = Arc::new(CountingStore::new(dir.path().join("remote")));
            let manager = CacheManager::new(store.clone(), KeyResolver::default(), settings);
            std::fs::create_dir_all(dir.path().join("ws")).unwrap();
            Self {
                dir,
                store,
                manager,
            }
        }

        fn ws(&self) -> PathBuf {
            self.dir.path().join("ws")
        }

        fn write(&self, relative: &str, contents: &[u8]) {
            let path = self.ws().join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }

        fn puts(&self) -> usize {
            self.store.puts.load(Ordering::SeqCst)
        }
    }

    fn directory(path: &str) -> Vec<CacheDefinition> {
        vec![CacheDefinition::new(path, StorageFormat::Directory)]
    }

    #[tokio::test]
    async fn deps_scenario_stores_one_object_per_file() {
        let env = Env::new(CacheSettings::default());
        env.write("deps/a.txt", &[b'a'; 10]);
        env.write("deps/b.txt", &[b'b'; 20]);
        let cancel = CancellationToken::new();

        let prepared = env.manager.prepare("job", &env.ws(), &directory("deps")).unwrap();
        env.manager.save(&prepared, &cancel).await.unwrap();

        let objects = list_all(env.store.as_ref(), "job/cache/deps/").await.unwrap();
        let listed: Vec<(String, u64)> = objects.into_iter().map(|o| (o.key, o.size)).collect();
        assert_eq!(
            listed,
            vec![
                ("job/cache/deps/a.txt".to_string(), 10),
                ("job/cache/deps/b.txt".to_string(), 20),
            ]
        );

        // Unchanged workspace: nothing to upload
        env.manager.save(&prepared, &cancel).await.unwrap();
        assert_eq!(env.puts(), 2);
    }

    #[tokio::test]
    async fn restored_files_are_not_reuploaded() {
        let env = Env::new(CacheSettings::default());
        env.write("deps/a.txt", b"a");
        let cancel = CancellationToken::new();
        let prepared = env.manager.prepare("job", &env.ws(), &directory("deps")).unwrap();

        env.manager.save(&prepared, &cancel).await.unwrap();
        std::fs::remove_dir_all(env.ws().join("deps")).unwrap();
        env.manager.restore(&prepared, &cancel).await.unwrap();
        env.manager.save(&prepared, &cancel).await.unwrap();

        assert_eq!(env.puts(), 1);
    }

    #[tokio::test]
    async fn newer_local_file_is_uploaded_again() {
        let env = Env::new(CacheSettings::default());
        env.write("deps/a.txt", b"v1");
        let cancel = CancellationToken::new();
        let prepared = env.manager.prepare("job", &env.ws(), &directory("deps")).unwrap();
        env.manager.save(&prepared, &cancel).await.unwrap();

        env.write("deps/a.txt", b"v2");
        let later = FileTime::from_unix_time(FileTime::now().unix_seconds() + 3600, 0);
        filetime::set_file_mtime(env.ws().join("deps/a.txt"), later).unwrap();
        env.manager.save(&prepared, &cancel).await.unwrap();
        assert_eq!(env.puts(), 2);

        std::fs::remove_dir_all(env.ws().join("deps")).unwrap();
        env.manager.restore(&prepared, &cancel).await.unwrap();
        assert_eq!(std::fs::read(env.ws().join("deps/a.txt")).unwrap(), b"v2");
    }

    #[tokio::test]
    async fn in_flight_uploads_stay_bounded() {
        let env = Env::new(CacheSettings {
            transfer_threshold: 5,
            max_concurrent_transfers: 3,
            ..Default::default()
        });
        for i in 0..40 {
            env.write(&format!("deps/f{:02}.bin", i), b"x");
        }
        let cancel = CancellationToken::new();
        let prepared = env.manager.prepare("job", &env.ws(), &directory("deps")).unwrap();

        env.manager.save(&prepared, &cancel).await.unwrap();

        assert_eq!(env.puts(), 40);
        assert!(env.store.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn digest_keyed_caches_use_disjoint_keys() {
        let env = Env::new(CacheSettings::default());
        env.write("package-lock.json", b"{\"v\":1}");
        env.write("node_modules/left-pad/index.js", b"module.exports = 1");
        let definitions = vec![
            CacheDefinition::new("node_modules", StorageFormat::Zip).with_descriptor("package-lock.json"),
        ];
        let cancel = CancellationToken::new();

        let first = env.manager.prepare("job", &env.ws(), &definitions).unwrap();
        env.manager.save(&first, &cancel).await.unwrap();

        env.write("package-lock.json", b"{\"v\":2}");
        let second = env.manager.prepare("job", &env.ws(), &definitions).unwrap();
        assert_ne!(first.caches[0].key, second.caches[0].key);

        std::fs::remove_dir_all(env.ws().join("node_modules")).unwrap();
        env.manager.restore(&second, &cancel).await.unwrap();
        assert!(!env.ws().join("node_modules/left-pad/index.js").exists());

        env.manager.restore(&first, &cancel).await.unwrap();
        assert!(env.ws().join("node_modules/left-pad/index.js").is_file());
    }

    #[tokio::test]
    async fn archive_is_written_once_per_key() {
        for format in [StorageFormat::Zip, StorageFormat::Tar] {
            let env = Env::new(CacheSettings::default());
            env.write("target/lib.rlib", b"compiled");
            let definitions = vec![CacheDefinition::new("target", format)];
            let cancel = CancellationToken::new();
            let prepared = env.manager.prepare("job", &env.ws(), &definitions).unwrap();

            env.manager.save(&prepared, &cancel).await.unwrap();
            env.write("target/other.rlib", b"more");
            env.manager.save(&prepared, &cancel).await.unwrap();
            assert_eq!(env.puts(), 1, "{} archive uploaded twice", format);

            std::fs::remove_dir_all(env.ws().join("target")).unwrap();
            env.manager.restore(&prepared, &cancel).await.unwrap();
            assert_eq!(
                std::fs::read(env.ws().join("target/lib.rlib")).unwrap(),
                b"compiled"
            );
            assert!(!env.ws().join("target/other.rlib").exists());
        }
    }

    #[tokio::test]
    async fn eviction_wipes_and_next_restore_is_cold() {
        let env = Env::new(CacheSettings {
            max_size_mb: 1,
            ..Default::default()
        });
        env.write("deps/big.bin", &vec![0u8; 2 * 1024 * 1024]);
        let cancel = CancellationToken::new();
        let prepared = env.manager.prepare("job", &env.ws(), &directory("deps")).unwrap();

        assert!(matches!(
            env.manager.save(&prepared, &cancel).await.unwrap(),
            SaveOutcome::Saved { .. }
        ));
        assert!(matches!(
            env.manager.save(&prepared, &cancel).await.unwrap(),
            SaveOutcome::Evicted { deleted: 1, .. }
        ));

        let restore_ws = env.dir.path().join("fresh");
        let cold = env.manager.prepare("job", &restore_ws, &directory("deps")).unwrap();
        let restored = env.manager.restore(&cold, &cancel).await.unwrap();
        assert_eq!(restored[0].files, 0);
    }

    #[tokio::test]
    async fn cancelled_save_is_interrupted() {
        let env = Env::new(CacheSettings::default());
        env.write("deps/a.txt", b"a");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let prepared = env.manager.prepare("job", &env.ws(), &directory("deps")).unwrap();

        let err = env.manager.save(&prepared, &cancel).await.unwrap_err();
        assert!(err.is_interrupted());
    }

    #[tokio::test]
    async fn partial_suffixed_files_are_cached_like_any_other() {
        let env = Env::new(CacheSettings::default());
        env.write("deps/a.txt", b"a");
        env.write("deps/download.partial", b"half");
        let cancel = CancellationToken::new();
        let prepared = env.manager.prepare("job", &env.ws(), &directory("deps")).unwrap();

        env.manager.save(&prepared, &cancel).await.unwrap();
        env.manager.save(&prepared, &cancel).await.unwrap();
        assert_eq!(env.puts(), 2);

        let fresh = env.dir.path().join("fresh");
        let cold = env.manager.prepare("job", &fresh, &directory("deps")).unwrap();
        let restored = env.manager.restore(&cold, &cancel).await.unwrap();
        assert_eq!(restored[0].files, 2);
        assert_eq!(std::fs::read(fresh.join("deps/download.partial")).unwrap(), b"half");
    }

    #[tokio::test]
    async fn job_total_stays_bounded_across_descriptor_changes() {
        let env = Env::new(CacheSettings {
            max_size_mb: 1,
            ..Default::default()
        });
        let definitions = vec![
            CacheDefinition::new("deps", StorageFormat::Directory).with_descriptor("deps.lock"),
        ];
        let cancel = CancellationToken::new();
        let cap = 1024 * 1024;

        for revision in 0..6u8 {
            env.write("deps.lock", &[revision]);
            env.write("deps/blob.bin", &vec![revision; 900 * 1024]);
            let prepared = env.manager.prepare("job", &env.ws(), &definitions).unwrap();
            env.manager.save(&prepared, &cancel).await.unwrap();

            // One save may land on top of a total just under the cap
            let stored = env.manager.job_total(&prepared).await.unwrap();
            assert!(stored < cap + 900 * 1024, "revision {} left {} bytes", revision, stored);
        }
    }
}
