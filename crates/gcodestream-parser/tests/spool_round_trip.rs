//! Command stores: spooled and in-memory jobs read back identically

use gcodestream_parser::{CommandSource, JobLoader, SpoolReader, SpoolWriter, StoreKind};

#[test]
fn test_spool_round_trip_preserves_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("job.gsw");

    let rows = [
        ("G1 X1", "G01 X1 (first)", 1u32, "first"),
        ("", "(comment only)", 2, "comment only"),
        ("G0 Z5", "G0 Z5", 3, ""),
    ];

    let mut writer = SpoolWriter::create(&path).unwrap();
    for (command, original, line, comment) in rows {
        writer.add_line(command, original, line, comment).unwrap();
    }
    let path = writer.finish().unwrap();

    let mut reader = SpoolReader::open(&path).unwrap();
    assert_eq!(reader.num_rows(), 3);

    for (i, (command, original, line, comment)) in rows.iter().enumerate() {
        let cmd = reader.next_command().unwrap().unwrap();
        assert_eq!(cmd.command, *command);
        assert_eq!(cmd.original, *original);
        assert_eq!(cmd.line_number, *line);
        assert_eq!(cmd.comment, *comment);
        assert_eq!(cmd.sequence_number, i as u32 + 1);
    }
    assert!(reader.next_command().unwrap().is_none());
    assert_eq!(reader.rows_remaining(), 0);
}

#[test]
fn test_spooled_and_memory_jobs_match() {
    let lines = [
        "G21 G90 (setup)",
        "G0 Z5",
        "; plunge",
        "G1 Z-1 F100",
        "G2 X10 Y0 I5 J0",
        "M5",
    ];
    let loader = JobLoader::default();
    let mut memory = loader.load_lines(lines, StoreKind::InMemory).unwrap();
    let mut spooled = loader.load_lines(lines, StoreKind::Spooled).unwrap();

    assert!(spooled.is_spooled());
    assert_eq!(memory.num_rows(), spooled.num_rows());

    while let Some(expected) = memory.source.next_command().unwrap() {
        let actual = spooled.source.next_command().unwrap().unwrap();
        assert_eq!(actual.command, expected.command);
        assert_eq!(actual.original, expected.original);
        assert_eq!(actual.comment, expected.comment);
        assert_eq!(actual.line_number, expected.line_number);
        assert_eq!(actual.sequence_number, expected.sequence_number);
    }
    assert!(spooled.source.next_command().unwrap().is_none());
}

#[test]
fn test_load_file_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("part.nc");
    std::fs::write(&path, "G21\nG0 X1 Y1\n\nG1 X2 Y2 F300\n").unwrap();

    let job = JobLoader::default()
        .load_file(&path, StoreKind::Auto)
        .unwrap();
    // The blank line produces no row.
    assert_eq!(job.num_rows(), 3);
    assert!(job.errors.is_empty());
}
