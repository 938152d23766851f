//! Integration tests for lease-proxy

mod proxy_tests {
    use lease_proxy::{
        CancellationToken, FileSource, LeaseRead, MemoryLeaser, ProxyError, ReadProxy,
    };
    use std::io::{Read, Seek, SeekFrom};
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn file_with(temp: &TempDir, content: &[u8]) -> FileSource {
        let path = temp.path().join("content.bin");
        std::fs::write(&path, content).unwrap();
        FileSource::new(path).unwrap()
    }

    fn numbered(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn file_backed_proxy_survives_revocation() {
        let temp = TempDir::new().unwrap();
        let content = numbered(10_000);
        let source = file_with(&temp, &content);
        let leaser = MemoryLeaser::new();
        let proxy = ReadProxy::new(Arc::new(leaser.clone()), source.len(), Arc::new(source));
        let cancel = CancellationToken::new();

        let mut out = Vec::new();
        let mut buf = [0u8; 1500];
        loop {
            let n = proxy.read(&cancel, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
            leaser.revoke_all();
        }

        assert_eq!(out, content);
        assert!(proxy.refresh_count() > 1);
        proxy.destroy();
        assert_eq!(leaser.stats().outstanding, 0);
    }

    #[test]
    fn reader_adapter_streams_content() {
        let temp = TempDir::new().unwrap();
        let content = numbered(4096);
        let source = file_with(&temp, &content);
        let leaser = MemoryLeaser::new();
        let proxy = ReadProxy::new(Arc::new(leaser.clone()), source.len(), Arc::new(source));
        let cancel = CancellationToken::new();

        let mut reader = proxy.reader(&cancel);
        reader.seek(SeekFrom::Start(96)).unwrap();
        leaser.revoke_all();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();

        assert_eq!(out, &content[96..]);
        assert_eq!(proxy.refresh_count(), 2);
    }

    #[test]
    fn upgrade_hands_over_contents() {
        let temp = TempDir::new().unwrap();
        let source = file_with(&temp, b"hello, lease");
        let leaser = MemoryLeaser::new();
        let proxy = ReadProxy::new(Arc::new(leaser.clone()), source.len(), Arc::new(source));
        let cancel = CancellationToken::new();

        let mut buf = [0u8; 5];
        proxy.read(&cancel, &mut buf).unwrap();

        let mut rwl = proxy.upgrade(&cancel).unwrap();
        rwl.seek(SeekFrom::Start(0)).unwrap();
        let mut out = vec![0u8; 12];
        assert_eq!(rwl.read(&mut out).unwrap(), 12);
        assert_eq!(&out, b"hello, lease");

        assert!(matches!(
            proxy.read(&cancel, &mut buf),
            Err(ProxyError::Revoked)
        ));
        assert_eq!(proxy.refresh_count(), 1);
    }

    #[test]
    fn truncated_file_reports_length_mismatch() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("content.bin");
        std::fs::write(&path, numbered(1024)).unwrap();
        let source = FileSource::new(&path).unwrap();
        std::fs::write(&path, numbered(1000)).unwrap();

        let leaser = MemoryLeaser::new();
        let proxy = ReadProxy::new(Arc::new(leaser.clone()), 1024, Arc::new(source));

        let mut buf = [0u8; 16];
        match proxy.read(&CancellationToken::new(), &mut buf) {
            Err(ProxyError::LengthMismatch { copied, expected }) => {
                assert_eq!(copied, 1000);
                assert_eq!(expected, 1024);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(leaser.stats().outstanding, 0);
    }

    #[test]
    fn concurrent_readers_under_revocation() {
        let temp = TempDir::new().unwrap();
        let content = Arc::new(numbered(64 * 1024));
        let source = file_with(&temp, &content);
        let leaser = MemoryLeaser::new();
        let proxy = Arc::new(ReadProxy::new(
            Arc::new(leaser.clone()),
            source.len(),
            Arc::new(source),
        ));

        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let proxy = Arc::clone(&proxy);
                let leaser = leaser.clone();
                let content = Arc::clone(&content);
                thread::spawn(move || {
                    let cancel = CancellationToken::new();
                    let mut buf = [0u8; 512];
                    for i in 0..32u64 {
                        let offset = (t * 4096 + i * 512) % (64 * 1024 - 512);
                        let n = proxy.read_at(&cancel, &mut buf, offset).unwrap();
                        let start = offset as usize;
                        assert_eq!(&buf[..n], &content[start..start + n]);
                        if i % 8 == t % 8 {
                            leaser.revoke_all();
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        proxy.destroy();
        assert_eq!(leaser.stats().outstanding, 0);
    }
}

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use sha2::{Digest, Sha256};
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn lease_proxy(temp: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("lease-proxy");
        cmd.env("LEASE_PROXY_CONFIG", temp.path().join("config.toml"));
        cmd
    }

    fn write_content(dir: &Path, len: usize) -> (PathBuf, Vec<u8>) {
        let content: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
        let path = dir.join("content.bin");
        std::fs::write(&path, &content).unwrap();
        (path, content)
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        lease_proxy(&temp)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("cat").and(predicate::str::contains("config")));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        lease_proxy(&temp)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("lease-proxy"));
    }

    #[test]
    fn cat_outputs_file() {
        let temp = TempDir::new().unwrap();
        let (path, content) = write_content(temp.path(), 200_000);

        lease_proxy(&temp)
            .arg("cat")
            .arg(&path)
            .args(["--chunk-size", "4096", "--revoke-every", "5"])
            .assert()
            .success()
            .stdout(content);
    }

    #[test]
    fn cat_offset_and_length() {
        let temp = TempDir::new().unwrap();
        let (path, content) = write_content(temp.path(), 1000);

        lease_proxy(&temp)
            .arg("cat")
            .arg(&path)
            .args(["--offset", "100", "--length", "50"])
            .assert()
            .success()
            .stdout(content[100..150].to_vec());
    }

    #[test]
    fn cat_digest_under_revocation() {
        let temp = TempDir::new().unwrap();
        let (path, content) = write_content(temp.path(), 50_000);
        let expected = hex::encode(Sha256::digest(&content));

        lease_proxy(&temp)
            .arg("cat")
            .arg(&path)
            .args(["--chunk-size", "1000", "--revoke-every", "1", "--digest"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with(expected));
    }

    #[test]
    fn cat_json_summary() {
        let temp = TempDir::new().unwrap();
        let (path, content) = write_content(temp.path(), 10_000);

        let output = lease_proxy(&temp)
            .arg("cat")
            .arg(&path)
            .args(["--chunk-size", "1000", "--revoke-every", "2", "--json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(summary["bytes"], 10_000);
        assert_eq!(summary["reads"], 10);
        // Revoked after reads 2, 4, 6, 8 and 10; reads 3, 5, 7, 9 and the EOF read refetch.
        assert_eq!(summary["refreshes"], 6);
        assert_eq!(summary["leaser"]["outstanding"], 0);
        assert_eq!(
            summary["sha256"],
            hex::encode(Sha256::digest(&content)).as_str()
        );
    }

    #[test]
    fn cat_missing_file() {
        let temp = TempDir::new().unwrap();

        lease_proxy(&temp)
            .arg("cat")
            .arg(temp.path().join("missing.bin"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("Path not found"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();

        lease_proxy(&temp)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();

        lease_proxy(&temp)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[read]"));
    }

    #[test]
    fn config_set_then_show() {
        let temp = TempDir::new().unwrap();

        lease_proxy(&temp)
            .args(["config", "set", "read.chunk_size", "4096"])
            .assert()
            .success();

        lease_proxy(&temp)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("chunk_size = 4096"));
    }

    #[test]
    fn config_set_unknown_key() {
        let temp = TempDir::new().unwrap();

        lease_proxy(&temp)
            .args(["config", "set", "read.nope", "1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }
}
