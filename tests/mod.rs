//! Main test module for mew
//!
//! This module includes all test suites:
//! - Integration tests for end-to-end capture and restore scenarios
//! - Property-based tests for invariants

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::mew::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let mew = Mew::open(temp_dir.path()).unwrap();

        let snap = mew.capture("Empty").unwrap();
        assert_eq!(snap.stats.entries(), 0);

        // Overlay restore leaves later files in place
        fs::write(temp_dir.path().join("file.txt"), "content").unwrap();
        let result = mew.restore(&snap.id).unwrap();
        assert_eq!(result.files_restored, 0);
        assert!(temp_dir.path().join("file.txt").exists());
    }

    #[test]
    fn test_special_filenames() {
        let temp_dir = TempDir::new().unwrap();
        let mew = Mew::open(temp_dir.path()).unwrap();

        let special_names = [
            "file with spaces.txt",
            "file-with-dashes.txt",
            "file.with.dots.txt",
            "file@with#special$chars.txt",
            "file(with)parens.txt",
            "file[with]brackets.txt",
            "file{with}braces.txt",
        ];

        let mut created = Vec::new();
        for name in &special_names {
            if fs::write(temp_dir.path().join(name), format!("Content of {}", name)).is_ok() {
                created.push(*name);
            }
        }

        let snap = mew.capture("Special names").unwrap();
        assert_eq!(snap.stats.files, created.len());

        for name in &created {
            fs::remove_file(temp_dir.path().join(name)).unwrap();
        }
        mew.restore(&snap.id).unwrap();

        for name in &created {
            let content = fs::read_to_string(temp_dir.path().join(name)).unwrap();
            assert_eq!(content, format!("Content of {}", name));
        }
    }

    #[test]
    fn test_unicode_filenames() {
        let temp_dir = TempDir::new().unwrap();
        let mew = Mew::open(temp_dir.path()).unwrap();

        let unicode_names = ["файл.txt", "文件.txt", "ファイル.txt", "αρχείο.txt", "🚀🌟💾.txt"];

        let mut created = Vec::new();
        for name in &unicode_names {
            if fs::write(temp_dir.path().join(name), format!("Unicode content: {}", name)).is_ok() {
                created.push(*name);
            }
        }
        if created.is_empty() {
            return;
        }

        let snap = mew.capture("Unicode names").unwrap();
        for name in &created {
            fs::remove_file(temp_dir.path().join(name)).unwrap();
        }
        mew.restore(&snap.id).unwrap();

        for name in &created {
            let content = fs::read_to_string(temp_dir.path().join(name)).unwrap();
            assert_eq!(content, format!("Unicode content: {}", name));
        }
    }

    #[test]
    fn test_long_paths() {
        let temp_dir = TempDir::new().unwrap();
        let mew = Mew::open(temp_dir.path()).unwrap();

        let mut dir = temp_dir.path().to_path_buf();
        for i in 0..12 {
            dir = dir.join(format!("a_fairly_long_directory_name_{:02}", i));
        }
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("deep_file_with_a_long_name.txt");
        fs::write(&file, "deep").unwrap();

        let snap = mew.capture("deep").unwrap();
        fs::remove_dir_all(temp_dir.path().join("a_fairly_long_directory_name_00")).unwrap();
        mew.restore(&snap.id).unwrap();

        assert_eq!(fs::read_to_string(&file).unwrap(), "deep");
    }

    #[test]
    fn test_permission_preservation() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let temp_dir = TempDir::new().unwrap();
            let mew = Mew::open(temp_dir.path()).unwrap();

            let files = [
                ("readable.txt", 0o644),
                ("executable.sh", 0o755),
                ("readonly.txt", 0o444),
                ("useronly.txt", 0o600),
            ];
            for (name, mode) in &files {
                let path = temp_dir.path().join(name);
                fs::write(&path, format!("Content of {}", name)).unwrap();
                fs::set_permissions(&path, fs::Permissions::from_mode(*mode)).unwrap();
            }

            let snap = mew.capture("Permissions").unwrap();

            for (name, _) in &files {
                let path = temp_dir.path().join(name);
                fs::set_permissions(&path, fs::Permissions::from_mode(0o666)).unwrap();
            }

            mew.restore(&snap.id).unwrap();

            for (name, expected_mode) in &files {
                let metadata = fs::metadata(temp_dir.path().join(name)).unwrap();
                let actual_mode = metadata.permissions().mode() & 0o777;
                assert_eq!(
                    actual_mode, *expected_mode,
                    "Permission mismatch for {}: expected {:o}, got {:o}",
                    name, expected_mode, actual_mode
                );
            }
        }
    }

    #[test]
    fn test_corrupt_index_reported() {
        let temp_dir = TempDir::new().unwrap();
        let mew = Mew::open(temp_dir.path()).unwrap();
        mew.init(false).unwrap();
        fs::write(mew.config().index_path(), "{ not json").unwrap();

        let err = mew.list().unwrap_err();
        assert!(err.is_corruption());
        assert!(mew.capture("after corruption").is_err());
    }
}

#[cfg(test)]
mod symlink_tests {
    use ::mew::*;
    use std::fs;
    use tempfile::TempDir;

    #[cfg(unix)]
    #[test]
    fn test_symlinks_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let mew = Mew::open(temp_dir.path()).unwrap();

        let target_path = temp_dir.path().join("target.txt");
        let link_path = temp_dir.path().join("link.txt");
        fs::write(&target_path, "Target content").unwrap();
        std::os::unix::fs::symlink("target.txt", &link_path).unwrap();

        let snap = mew.capture("With symlink").unwrap();
        assert_eq!(snap.stats.files, 1);
        assert_eq!(snap.stats.symlinks, 1);

        fs::remove_file(&link_path).unwrap();
        fs::remove_file(&target_path).unwrap();

        let result = mew.restore(&snap.id).unwrap();
        assert_eq!(result.files_restored, 1);
        assert_eq!(result.symlinks_restored, 1);

        let link_meta = fs::symlink_metadata(&link_path).unwrap();
        assert!(link_meta.file_type().is_symlink());
        assert_eq!(fs::read_link(&link_path).unwrap(), std::path::PathBuf::from("target.txt"));
        assert_eq!(fs::read_to_string(&link_path).unwrap(), "Target content");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_not_followed_on_capture() {
        let temp_dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), "outside").unwrap();
        std::os::unix::fs::symlink(outside.path(), temp_dir.path().join("escape")).unwrap();

        let mew = Mew::open(temp_dir.path()).unwrap();
        let snap = mew.capture("links").unwrap();

        let headers = mew.entries(&snap.id).unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].kind, EntryKind::Symlink);
    }
}

pub use integration::MewTestHarness;
