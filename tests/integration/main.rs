//! Integration tests for nuget-fetch

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;

    /// Command isolated from the user's config and caches
    fn nuget_fetch(temp: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("nuget-fetch");
        cmd.env("NUGET_FETCH_CONFIG", temp.path().join("config.toml"))
            .env("NUGET_PACKAGES", temp.path().join("packages"))
            .env("NUGET_HTTP_CACHE_PATH", temp.path().join("http-cache"))
            .env("CI", "true");
        cmd
    }

    fn write_nupkg(dir: &Path, id: &str, version: &str) {
        std::fs::create_dir_all(dir).unwrap();
        let file = std::fs::File::create(dir.join(format!("{id}.{version}.nupkg"))).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file(format!("{id}.nuspec"), options).unwrap();
        write!(
            zip,
            r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata>
    <id>{id}</id>
    <version>{version}</version>
    <authors>Test</authors>
    <description>Test package</description>
  </metadata>
</package>"#
        )
        .unwrap();
        zip.start_file("lib/net8.0/Test.dll", options).unwrap();
        zip.write_all(b"MZ").unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        nuget_fetch(&temp)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("NuGet package download"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        nuget_fetch(&temp)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("nuget-fetch"));
    }

    #[test]
    fn config_path_follows_env() {
        let temp = TempDir::new().unwrap();
        nuget_fetch(&temp)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                temp.path().join("config.toml").to_string_lossy().to_string(),
            ));
    }

    #[test]
    fn config_show_defaults() {
        let temp = TempDir::new().unwrap();
        nuget_fetch(&temp)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("api.nuget.org"));
    }

    #[test]
    fn config_init_writes_file() {
        let temp = TempDir::new().unwrap();
        nuget_fetch(&temp).args(["config", "init"]).assert().success();
        assert!(temp.path().join("config.toml").is_file());

        nuget_fetch(&temp)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--force"));
    }

    #[test]
    fn invalid_config_reports_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.toml"), "[http\nmax_tries = ").unwrap();
        nuget_fetch(&temp)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn cache_path_shows_env_locations() {
        let temp = TempDir::new().unwrap();
        nuget_fetch(&temp)
            .args(["cache", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                temp.path().join("packages").to_string_lossy().to_string(),
            ))
            .stdout(predicate::str::contains(
                temp.path().join("http-cache").to_string_lossy().to_string(),
            ));
    }

    #[test]
    fn cache_clear_requires_target() {
        let temp = TempDir::new().unwrap();
        nuget_fetch(&temp).args(["cache", "clear"]).assert().failure();
    }

    #[test]
    fn cache_clear_http() {
        let temp = TempDir::new().unwrap();
        let http_cache = temp.path().join("http-cache").join("abcdef");
        std::fs::create_dir_all(&http_cache).unwrap();
        std::fs::write(http_cache.join("list_a.dat"), "{}").unwrap();
        std::fs::create_dir_all(temp.path().join("packages")).unwrap();

        nuget_fetch(&temp)
            .args(["cache", "clear", "--http", "--yes"])
            .assert()
            .success();
        assert!(!temp.path().join("http-cache").exists());
        assert!(temp.path().join("packages").exists());
    }

    #[test]
    fn local_type_detects_layouts() {
        let temp = TempDir::new().unwrap();
        let empty = temp.path().join("empty");
        std::fs::create_dir_all(&empty).unwrap();
        nuget_fetch(&temp)
            .args(["local", "type"])
            .arg(&empty)
            .assert()
            .success()
            .stdout(predicate::str::contains("unknown"));

        let v2 = temp.path().join("v2");
        write_nupkg(&v2, "Contoso.Utils", "1.0.0");
        nuget_fetch(&temp)
            .args(["local", "type"])
            .arg(&v2)
            .assert()
            .success()
            .stdout(predicate::str::contains("v2"));
    }

    #[test]
    fn local_type_rejects_remote_uri() {
        let temp = TempDir::new().unwrap();
        nuget_fetch(&temp)
            .args(["local", "type", "https://api.nuget.org/v3/index.json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to verify the root directory"));
    }

    #[test]
    fn local_list_v2_feed() {
        let temp = TempDir::new().unwrap();
        let feed = temp.path().join("feed");
        write_nupkg(&feed, "Contoso.Utils", "1.0.0");
        write_nupkg(&feed.join("nested"), "Contoso.Utils", "2.0.0-beta");
        write_nupkg(&feed, "Other", "3.1.0");

        nuget_fetch(&temp)
            .args(["local", "list", "--format", "json", "--id", "contoso.utils"])
            .arg(&feed)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"1.0.0\""))
            .stdout(predicate::str::contains("\"2.0.0-beta\""))
            .stdout(predicate::str::contains("Other").not());
    }

    #[test]
    fn install_rejects_bad_version() {
        let temp = TempDir::new().unwrap();
        nuget_fetch(&temp)
            .args(["install", "Contoso.Utils", "not-a-version"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not a valid version string"));
    }
}
