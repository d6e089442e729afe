mod common;

use common::{args, path_str, run_with_config, write_file, PEOPLE_CSV, PEOPLE_MAPPING};
use tabula::config::AppConfig;
use tabula::invocation_options;
use tempfile::TempDir;

const NAME_ONLY: &str = "[[query]]\noffset = 1\nconstruct = [\"<http://e/{id}> <http://e/n> ?name\"]\n";

#[test]
fn test_config_selects_ntriples() {
    let dir = TempDir::new().unwrap();
    let mapping = write_file(dir.path(), "people.toml", PEOPLE_MAPPING);
    let data = write_file(dir.path(), "people.csv", PEOPLE_CSV);

    let mut config = AppConfig::default();
    config.output.ntriples = true;

    let (out, _) = run_with_config(&args(&[&path_str(&mapping), &path_str(&data)]), &config);
    assert!(!out.contains("@prefix"));
    assert!(out.contains("<http://example.org/person/1> <http://example.org/ns#name> \"Ann\" ."));
}

#[test]
fn test_config_dedup_window_applies_unless_overridden() {
    let dir = TempDir::new().unwrap();
    let mapping = write_file(
        dir.path(),
        "m.toml",
        "[[query]]\noffset = 1\nconstruct = [\"<http://e/s> <http://e/p> <http://e/o>\"]\n",
    );
    let data = write_file(dir.path(), "d.csv", "id\n1\n2\n");
    let (mapping, data) = (path_str(&mapping), path_str(&data));

    let mut config = AppConfig::default();
    config.output.ntriples = true;
    config.output.dedup_window = 0;

    let (out, _) = run_with_config(&args(&[&mapping, &data]), &config);
    assert_eq!(out.lines().count(), 2);

    let (out, _) = run_with_config(&args(&[&mapping, &data, "--dedup", "5"]), &config);
    assert_eq!(out.lines().count(), 1);
}

#[test]
fn test_config_delimiter_used_and_cli_overrides() {
    let dir = TempDir::new().unwrap();
    let mapping = path_str(&write_file(dir.path(), "m.toml", NAME_ONLY));
    let semicolons = path_str(&write_file(dir.path(), "s.txt", "id;name\n1;Ann\n"));
    let pipes = path_str(&write_file(dir.path(), "p.txt", "id|name\n2|Bob\n"));

    let mut config = AppConfig::default();
    config.input.delimiter = Some("semicolon".to_string());

    let (out, _) = run_with_config(&args(&[&mapping, &semicolons, "--ntriples"]), &config);
    assert_eq!(out, "<http://e/1> <http://e/n> \"Ann\" .\n");

    let (out, _) = run_with_config(&args(&[&mapping, &pipes, "--ntriples", "-d", "|"]), &config);
    assert_eq!(out, "<http://e/2> <http://e/n> \"Bob\" .\n");
}

#[test]
fn test_fragment_beats_config() {
    let dir = TempDir::new().unwrap();
    let mapping = path_str(&write_file(dir.path(), "m.toml", NAME_ONLY));
    write_file(dir.path(), "p.txt", "id|name\n3|Cy\n");
    let locator = format!("{}#delimiter=%7C", path_str(&dir.path().join("p.txt")));

    let mut config = AppConfig::default();
    config.input.delimiter = Some("semicolon".to_string());

    let (out, _) = run_with_config(&args(&[&mapping, &locator, "--ntriples"]), &config);
    assert_eq!(out, "<http://e/3> <http://e/n> \"Cy\" .\n");
}

#[test]
fn test_config_header_setting_disables_offset_coupling() {
    let dir = TempDir::new().unwrap();
    let mapping = path_str(&write_file(dir.path(), "m.toml", NAME_ONLY));
    let data = path_str(&write_file(dir.path(), "people.csv", PEOPLE_CSV));

    let mut config = AppConfig::default();
    config.input.has_header = Some(true);

    // Header consumed by the tokenizer and offset 1 still skips a data row
    let (out, summary) = run_with_config(&args(&[&mapping, &data, "--ntriples"]), &config);
    assert_eq!(summary.records, 1);
    assert_eq!(out, "<http://e/2> <http://e/n> \"Bob\" .\n");
}

#[test]
fn test_invalid_config_delimiter_fails_run() {
    let mut config = AppConfig::default();
    config.input.delimiter = Some("none".to_string());

    let err = invocation_options(&args(&["m.toml"]), &config).unwrap_err();
    assert!(err.to_string().contains("input.delimiter"), "got: {err}");
}
