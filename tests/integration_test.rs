use secu_engine::{
    create_archive, create_archive_with, extract_archive, extract_archive_with, ArchiveHeader,
    ArchiveOptions, ArchiveReader, EntryType, ErrorKind, ExtractOptions, CURRENT_VERSION,
    HEADER_SIZE,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, data: &[u8]) {
    let p = root.join(rel);
    fs::create_dir_all(p.parent().unwrap()).unwrap();
    fs::write(p, data).unwrap();
}

/// `{a.txt: "hello", sub/b.txt: "world!"}`
fn reference_tree(tmp: &TempDir) -> PathBuf {
    let src = tmp.path().join("src");
    write(&src, "a.txt", b"hello");
    write(&src, "sub/b.txt", b"world!");
    src
}

/// Relative path → contents (`None` for directories) of everything under `root`.
fn snapshot(root: &Path) -> Vec<(String, Option<Vec<u8>>)> {
    let mut out = Vec::new();
    for ent in walkdir::WalkDir::new(root).min_depth(1) {
        let ent = ent.unwrap();
        let rel = ent.path().strip_prefix(root).unwrap().to_str().unwrap().replace('\\', "/");
        let data = if ent.file_type().is_dir() { None } else { Some(fs::read(ent.path()).unwrap()) };
        out.push((rel, data));
    }
    out.sort();
    out
}

fn raw_entry(name: &[u8], offset: u64, size: u64, kind: u8) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(name.len() as u16).to_le_bytes());
    out.extend_from_slice(name);
    out.extend_from_slice(&offset.to_le_bytes());
    out.extend_from_slice(&size.to_le_bytes());
    out.push(kind);
    out
}

/// Assemble an archive from raw table bytes so malformed layouts can be tested.
fn craft(path: &Path, count: u64, table: &[u8], data: &[u8]) {
    let header = ArchiveHeader {
        version:           CURRENT_VERSION,
        file_count:        count,
        file_table_offset: HEADER_SIZE as u64,
        data_table_offset: (HEADER_SIZE + table.len()) as u64,
    };
    let mut bytes = header.encode().to_vec();
    bytes.extend_from_slice(table);
    bytes.extend_from_slice(data);
    fs::write(path, bytes).unwrap();
}

#[test]
fn test_reference_scenario() {
    let tmp = TempDir::new().unwrap();
    let src = reference_tree(&tmp);
    let archive = tmp.path().join("ref.secu");

    create_archive(&archive, &src).unwrap();

    let reader = ArchiveReader::open(&archive).unwrap();
    let h = reader.header();
    assert_eq!(h.version, CURRENT_VERSION);
    assert_eq!(h.file_count, 3);
    assert_eq!(h.file_table_offset, 32);

    let got: Vec<(&str, u64, u64, EntryType)> = reader
        .entries()
        .iter()
        .map(|e| (e.name.as_str(), e.offset, e.size, e.kind))
        .collect();
    assert_eq!(
        got,
        [
            ("a.txt", 0, 5, EntryType::File),
            ("sub", 0, 0, EntryType::Directory),
            ("sub/b.txt", 5, 6, EntryType::File),
        ]
    );

    let bytes = fs::read(&archive).unwrap();
    assert_eq!(&bytes[..4], b"SECU");
    assert_eq!(&bytes[h.data_table_offset as usize..], b"helloworld!");

    let dest = tmp.path().join("dest");
    extract_archive(&archive, &dest).unwrap();
    assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"hello");
    assert_eq!(fs::read(dest.join("sub").join("b.txt")).unwrap(), b"world!");
    assert!(dest.join("sub").is_dir());
}

#[test]
fn test_round_trip_preserves_tree() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    write(&src, "readme.md", b"# title\n");
    write(&src, "bin/blob.dat", &(0u8..=255).cycle().take(70_000).collect::<Vec<u8>>());
    write(&src, "bin/empty.dat", b"");
    write(&src, "deep/er/still/leaf.txt", b"leaf");
    write(&src, "unicode/\u{00e9}t\u{00e9}.txt", "caf\u{00e9}".as_bytes());
    fs::create_dir_all(src.join("empty_dir/nested_empty")).unwrap();

    let archive = tmp.path().join("tree.secu");
    create_archive(&archive, &src).unwrap();

    let dest = tmp.path().join("dest");
    extract_archive(&archive, &dest).unwrap();
    assert_eq!(snapshot(&src), snapshot(&dest));

    let mut reader = ArchiveReader::open(&archive).unwrap();
    let report = reader.verify().unwrap();
    assert_eq!(report.files, 5);
    assert_eq!(report.data_bytes, 8 + 70_000 + 4 + 5);
}

#[test]
fn test_legacy_layout_round_trip() {
    let tmp = TempDir::new().unwrap();
    let src = reference_tree(&tmp);
    let archive = tmp.path().join("v1.secu");

    let opts = ArchiveOptions { format_version: 1, ..Default::default() };
    create_archive_with(&archive, &src, &opts).unwrap();

    let reader = ArchiveReader::open(&archive).unwrap();
    assert_eq!(reader.header().version, 1);
    assert_eq!(reader.header().data_table_offset, 32 + 3 * 529);
    assert_eq!(fs::metadata(&archive).unwrap().len(), 32 + 3 * 529 + 11);

    let dest = tmp.path().join("dest");
    extract_archive(&archive, &dest).unwrap();
    assert_eq!(snapshot(&src), snapshot(&dest));
}

#[test]
fn test_archives_are_deterministic() {
    let tmp = TempDir::new().unwrap();
    let src = reference_tree(&tmp);
    write(&src, "z/y/x.bin", &[7u8; 1000]);
    write(&src, "m.txt", b"middle");

    let a = tmp.path().join("one.secu");
    let b = tmp.path().join("two.secu");
    create_archive(&a, &src).unwrap();
    create_archive(&b, &src).unwrap();
    assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
}

#[test]
fn test_empty_directory() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("empty");
    fs::create_dir(&src).unwrap();
    let archive = tmp.path().join("empty.secu");

    create_archive(&archive, &src).unwrap();
    let bytes = fs::read(&archive).unwrap();
    assert_eq!(bytes.len(), HEADER_SIZE);
    let h = ArchiveHeader::decode(&bytes).unwrap();
    assert_eq!(h.file_count, 0);
    assert_eq!(h.file_table_offset, 32);
    assert_eq!(h.data_table_offset, 32);

    let dest = tmp.path().join("out");
    extract_archive(&archive, &dest).unwrap();
    assert!(dest.is_dir());
    assert_eq!(fs::read_dir(&dest).unwrap().count(), 0);
}

#[test]
fn test_traversal_entries_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let dest = tmp.path().join("jail").join("dest");

    for name in [&b"../outside.txt"[..], b"/etc/passwd", b"ok/../../escape.txt"] {
        let archive = tmp.path().join("evil.secu");
        craft(&archive, 1, &raw_entry(name, 0, 4, 0), b"evil");

        let err = extract_archive(&archive, &dest).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathTraversal, "{:?}", String::from_utf8_lossy(name));
    }
    assert!(!dest.exists());
    assert!(!tmp.path().join("jail").join("outside.txt").exists());
    assert!(!tmp.path().join("escape.txt").exists());
}

#[test]
fn test_header_is_validated_before_table() {
    let tmp = TempDir::new().unwrap();
    let src = reference_tree(&tmp);
    let archive = tmp.path().join("h.secu");
    create_archive(&archive, &src).unwrap();
    let good = fs::read(&archive).unwrap();
    let dest = tmp.path().join("dest");

    let mut bad_magic = good.clone();
    bad_magic[..4].copy_from_slice(b"ZIP!");
    fs::write(&archive, &bad_magic).unwrap();
    assert_eq!(extract_archive(&archive, &dest).unwrap_err().kind(), ErrorKind::Format);

    let mut bad_version = good.clone();
    bad_version[4..8].copy_from_slice(&(CURRENT_VERSION + 1).to_le_bytes());
    fs::write(&archive, &bad_version).unwrap();
    assert_eq!(extract_archive(&archive, &dest).unwrap_err().kind(), ErrorKind::Format);

    fs::write(&archive, &good[..20]).unwrap();
    assert_eq!(extract_archive(&archive, &dest).unwrap_err().kind(), ErrorKind::Format);

    assert!(!dest.exists());
}

#[test]
fn test_out_of_bounds_entry_aborts_before_any_write() {
    let tmp = TempDir::new().unwrap();
    let archive = tmp.path().join("oob.secu");
    let mut table = raw_entry(b"first.txt", 0, 3, 0);
    table.extend(raw_entry(b"second.txt", 3, 100, 0));
    craft(&archive, 2, &table, b"abcdef");

    let dest = tmp.path().join("dest");
    let err = extract_archive(&archive, &dest).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(!dest.join("first.txt").exists());

    let mut table = raw_entry(b"wrap.txt", u64::MAX - 1, 4, 0);
    table.extend(raw_entry(b"x", 0, 0, 0));
    craft(&archive, 2, &table, b"");
    assert_eq!(extract_archive(&archive, &dest).unwrap_err().kind(), ErrorKind::Format);
}

#[test]
fn test_file_count_must_match_table() {
    let tmp = TempDir::new().unwrap();
    let archive = tmp.path().join("count.secu");
    let mut table = raw_entry(b"a", 0, 1, 0);
    table.extend(raw_entry(b"b", 1, 1, 0));

    craft(&archive, 1, &table, b"ab");
    assert_eq!(ArchiveReader::open(&archive).err().unwrap().kind(), ErrorKind::Format);

    craft(&archive, 3, &table, b"ab");
    assert_eq!(ArchiveReader::open(&archive).err().unwrap().kind(), ErrorKind::Format);

    craft(&archive, 2, &table, b"ab");
    assert!(ArchiveReader::open(&archive).is_ok());
}

#[test]
fn test_directories_are_implied_when_absent() {
    let tmp = TempDir::new().unwrap();
    let archive = tmp.path().join("implied.secu");
    craft(&archive, 1, &raw_entry(b"x/y/z.txt", 0, 2, 0), b"hi");

    let dest = tmp.path().join("dest");
    extract_archive(&archive, &dest).unwrap();
    assert_eq!(fs::read(dest.join("x").join("y").join("z.txt")).unwrap(), b"hi");
}

#[test]
fn test_extract_overwrite_policy() {
    let tmp = TempDir::new().unwrap();
    let src = reference_tree(&tmp);
    let archive = tmp.path().join("o.secu");
    create_archive(&archive, &src).unwrap();

    let dest = tmp.path().join("dest");
    write(&dest, "a.txt", b"old contents, longer than new");

    let err = extract_archive_with(&archive, &dest, &ExtractOptions { overwrite: false }).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"old contents, longer than new");

    extract_archive(&archive, &dest).unwrap();
    assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"hello");
}

#[test]
fn test_create_replaces_existing_archive_atomically() {
    let tmp = TempDir::new().unwrap();
    let src = reference_tree(&tmp);
    let out = tmp.path().join("out");
    fs::create_dir(&out).unwrap();
    let archive = out.join("a.secu");
    fs::write(&archive, b"stale").unwrap();

    create_archive(&archive, &src).unwrap();
    assert!(ArchiveReader::open(&archive).is_ok());

    // Only the archive itself; no temporary files left behind.
    let names: Vec<_> = fs::read_dir(&out).unwrap().map(|e| e.unwrap().file_name()).collect();
    assert_eq!(names, ["a.secu"]);
}

#[cfg(unix)]
#[test]
fn test_failed_create_leaves_destination_untouched() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    let src = reference_tree(&tmp);
    let locked = src.join("locked.bin");
    fs::write(&locked, b"secret").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::File::open(&locked).is_ok() {
        // Running with privileges that ignore permission bits.
        return;
    }

    let out = tmp.path().join("out");
    fs::create_dir(&out).unwrap();
    let archive = out.join("a.secu");
    fs::write(&archive, b"previous").unwrap();

    let err = create_archive(&archive, &src).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(fs::read(&archive).unwrap(), b"previous");
    assert_eq!(fs::read_dir(&out).unwrap().count(), 1);
}

#[test]
fn test_overlong_source_name_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    let component = "n".repeat(200);
    write(&src, &format!("{component}/{component}/{component}.txt"), b"x");

    let archive = tmp.path().join("long.secu");
    let err = create_archive(&archive, &src).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(!archive.exists());
}

#[test]
fn test_extract_never_overwrites_source_archive() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    write(&src, "a.secu", &vec![7u8; 100_000]);
    write(&src, "b.txt", b"beside");

    let out = tmp.path().join("out");
    fs::create_dir(&out).unwrap();
    let archive = out.join("a.secu");
    create_archive(&archive, &src).unwrap();
    let before = fs::read(&archive).unwrap();

    let err = extract_archive(&archive, &out).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(fs::read(&archive).unwrap(), before);
    assert!(ArchiveReader::open(&archive).is_ok());
}

#[cfg(unix)]
#[test]
fn test_symlinked_file_target_is_refused() {
    let tmp = TempDir::new().unwrap();
    let src = reference_tree(&tmp);
    let archive = tmp.path().join("s.secu");
    create_archive(&archive, &src).unwrap();

    let outside = tmp.path().join("outside.txt");
    fs::write(&outside, b"untouched").unwrap();
    let dest = tmp.path().join("dest");
    fs::create_dir(&dest).unwrap();
    std::os::unix::fs::symlink(&outside, dest.join("a.txt")).unwrap();

    let err = extract_archive(&archive, &dest).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PathTraversal);
    assert_eq!(fs::read(&outside).unwrap(), b"untouched");
}

#[cfg(unix)]
#[test]
fn test_drive_prefixed_source_name_is_not_portable() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    write(&src, "a:b.txt", b"colon");

    let archive = tmp.path().join("c.secu");
    let err = create_archive(&archive, &src).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(!archive.exists());
}
