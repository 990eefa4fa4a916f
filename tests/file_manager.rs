// Integration tests for FileManager: reading/writing G-code files and
// listing a directory, backed by real temp-directory I/O rather than
// mocks, matching the teacher's tempfile-based async test style.

use krusty_rs::file_manager::FileManager;
use std::io::Write;
use tempfile::tempdir;

#[tokio::test]
async fn write_then_read_round_trips_file_contents() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("part.gcode");
    let fm = FileManager::new();

    fm.write_gcode_file(path.to_str().unwrap(), "G1 X10 Y10 F1500\n")
        .await
        .unwrap();
    let content = fm.read_gcode_file(path.to_str().unwrap()).await.unwrap();
    assert_eq!(content, "G1 X10 Y10 F1500\n");
}

#[tokio::test]
async fn read_gcode_file_errors_on_a_missing_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing.gcode");
    let fm = FileManager::new();
    assert!(fm.read_gcode_file(path.to_str().unwrap()).await.is_err());
}

#[tokio::test]
async fn list_files_reports_names_and_directory_flag() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("a.gcode"), "G1 X1\n").unwrap();
    std::fs::create_dir(dir.path().join("subdir")).unwrap();

    let fm = FileManager::new();
    let mut files = fm.list_files(dir.path().to_str().unwrap()).await.unwrap();
    files.sort_by(|a, b| a.name.cmp(&b.name));

    assert_eq!(files.len(), 2);
    assert_eq!(files[0].name, "a.gcode");
    assert!(!files[0].is_directory);
    assert_eq!(files[1].name, "subdir");
    assert!(files[1].is_directory);
}

#[tokio::test]
async fn process_gcode_file_strips_blank_lines_and_comments() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("job.gcode");
    {
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "; header comment").unwrap();
        writeln!(f, "G28").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "  G1 X10 Y10 F1500  ").unwrap();
        writeln!(f, "; trailing comment").unwrap();
    }

    let fm = FileManager::new();
    let lines = fm.process_gcode_file(path.to_str().unwrap()).await.unwrap();
    assert_eq!(lines, vec!["G28".to_string(), "G1 X10 Y10 F1500".to_string()]);
}
