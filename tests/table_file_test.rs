use anyhow::Result;
use rand::{Rng, RngCore};
use tempfile::tempdir;

use tablefile::catalog::{ColumnDef, DataType, Schema};
use tablefile::storage::page::PageHandle;
use tablefile::storage::{delete_table, HeapPageFactory, PageId, StorageError, TableFile};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn two_column_schema() -> Schema {
    Schema::with_columns(
        4096,
        vec![
            ColumnDef::new("id", DataType::Int, 4).unique(),
            ColumnDef::new("name", DataType::VarChar, 32).nullable(),
        ],
    )
    .unwrap()
}

#[test]
fn test_full_lifecycle() -> Result<()> {
    init_logging();
    let dir = tempdir()?;
    let path = dir.path().join("users.tbl");

    let table = TableFile::create(&path, two_column_schema(), HeapPageFactory)?;
    // A 4096-byte page size leaves the whole header inside page slot 0.
    assert_eq!(table.first_data_page_number(), PageId(1));
    assert!(table.is_empty());

    let page_size = table.page_size() as usize;
    let mut buffers = vec![vec![0u8; page_size]; 3];
    for (i, buffer) in buffers.iter_mut().enumerate() {
        let mut page = table.reserve_page(buffer)?;
        page.insert_tuple(format!("tuple for page {}", i + 1).as_bytes())?;
        let number = page.page_number();
        table.write_page(number, buffer)?;
    }
    assert_eq!(table.last_data_page_number(), PageId(3));
    assert_eq!(std::fs::metadata(&path)?.len(), 4 * 4096u64);
    table.close()?;

    let table = TableFile::open(&path, HeapPageFactory)?;
    assert_eq!(table.schema(), &two_column_schema());
    assert_eq!(table.last_data_page_number(), PageId(3));

    let mut r1 = vec![0u8; page_size];
    let mut r2 = vec![0u8; page_size];
    let mut r3 = vec![0u8; page_size];
    let mut reads: Vec<&mut [u8]> = vec![&mut r1, &mut r2, &mut r3];
    let pages = table.read_pages(PageId(1), &mut reads)?;
    for (i, page) in pages.iter().enumerate() {
        assert_eq!(page.page_number(), PageId(i as u64 + 1));
        assert_eq!(
            page.get_tuple(0)?,
            format!("tuple for page {}", i + 1).as_bytes()
        );
    }

    table.close()?;
    delete_table(&path)?;
    assert!(!path.exists());
    Ok(())
}

#[test]
fn test_batched_write_matches_single_writes() -> Result<()> {
    init_logging();
    let dir = tempdir()?;

    let batched_path = dir.path().join("batched.tbl");
    let single_path = dir.path().join("single.tbl");
    let batched = TableFile::create(&batched_path, two_column_schema(), HeapPageFactory)?;
    let single = TableFile::create(&single_path, two_column_schema(), HeapPageFactory)?;
    let page_size = batched.page_size() as usize;

    let mut b1 = vec![0u8; page_size];
    let mut b2 = vec![0u8; page_size];
    let mut b3 = vec![0u8; page_size];
    {
        let mut p1 = batched.reserve_page(&mut b1)?;
        p1.insert_tuple(b"alpha")?;
        let mut p2 = batched.reserve_page(&mut b2)?;
        p2.insert_tuple(b"beta")?;
        let mut p3 = batched.reserve_page(&mut b3)?;
        p3.insert_tuple(b"gamma")?;
        batched.write_pages(PageId(1), &[p1, p2, p3])?;
    }

    for data in [&b1, &b2, &b3] {
        let mut buffer = vec![0u8; page_size];
        let page = single.reserve_page(&mut buffer)?;
        let number = page.page_number();
        drop(page);
        buffer.copy_from_slice(data);
        single.write_page(number, &buffer)?;
    }

    assert_eq!(
        std::fs::metadata(&batched_path)?.len(),
        std::fs::metadata(&single_path)?.len()
    );
    for number in 1..=3u64 {
        let mut from_batched = vec![0u8; page_size];
        let mut from_single = vec![0u8; page_size];
        batched.read_page(PageId(number), &mut from_batched)?;
        single.read_page(PageId(number), &mut from_single)?;
        assert_eq!(from_batched, from_single);
    }
    Ok(())
}

#[test]
fn test_header_spilling_past_first_page_slot() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("wide.tbl");

    // 30 three-character column names push the header past 512 bytes, so
    // the first data page lands in slot 2.
    let columns: Vec<ColumnDef> = (0..30)
        .map(|i| ColumnDef::new(&format!("c{:02}", i), DataType::BigInt, 8))
        .collect();
    let schema = Schema::with_columns(512, columns)?;

    let table = TableFile::create(&path, schema.clone(), HeapPageFactory)?;
    assert_eq!(table.first_data_page_number(), PageId(2));
    assert_eq!(table.last_data_page_number(), PageId(1));
    assert!(table.is_empty());

    let mut buffer = vec![0u8; 512];
    let page = table.reserve_page(&mut buffer)?;
    let number = page.page_number();
    assert_eq!(number, PageId(2));
    table.write_page(number, &buffer)?;
    table.close()?;

    let table = TableFile::open(&path, HeapPageFactory)?;
    assert_eq!(table.schema(), &schema);
    assert_eq!(table.first_data_page_number(), PageId(2));
    assert_eq!(table.last_data_page_number(), PageId(2));
    Ok(())
}

#[test]
fn test_truncate_then_refill() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("t.tbl");
    let table = TableFile::create(&path, two_column_schema(), HeapPageFactory)?;
    let page_size = table.page_size() as usize;

    for _ in 0..4 {
        let mut buffer = vec![0u8; page_size];
        let page = table.reserve_page(&mut buffer)?;
        let number = page.page_number();
        table.write_page(number, &buffer)?;
    }
    table.truncate()?;
    assert!(table.is_empty());

    let mut buffer = vec![0u8; page_size];
    {
        let mut page = table.reserve_page(&mut buffer)?;
        assert_eq!(page.page_number(), PageId(1));
        page.insert_tuple(b"after truncate")?;
    }
    table.write_page(PageId(1), &buffer)?;

    let mut read_buffer = vec![0u8; page_size];
    let page = table.read_page(PageId(1), &mut read_buffer)?;
    assert_eq!(page.get_tuple(0)?, b"after truncate");
    Ok(())
}

#[test]
fn test_lock_conflict_between_managers() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("t.tbl");

    let first = TableFile::create(&path, two_column_schema(), HeapPageFactory)?;
    match TableFile::open(&path, HeapPageFactory) {
        Err(StorageError::LockConflict { path: conflicted }) => {
            assert_eq!(conflicted, path);
        }
        other => panic!("expected LockConflict, got {:?}", other.map(|_| ())),
    }
    // Creating over a held file must also fail without clobbering it.
    assert!(matches!(
        TableFile::create(&path, two_column_schema(), HeapPageFactory),
        Err(StorageError::LockConflict { .. })
    ));

    first.close()?;
    let reopened = TableFile::open(&path, HeapPageFactory)?;
    reopened.close()?;
    Ok(())
}

#[test]
fn test_corrupted_magic_is_rejected() -> Result<()> {
    use std::io::{Seek, SeekFrom, Write};

    let dir = tempdir()?;
    let path = dir.path().join("t.tbl");
    TableFile::create(&path, two_column_schema(), HeapPageFactory)?.close()?;

    let mut file = std::fs::OpenOptions::new().write(true).open(&path)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&[0xDE, 0xAD, 0xBE, 0xEF])?;
    drop(file);

    assert!(matches!(
        TableFile::open(&path, HeapPageFactory),
        Err(StorageError::CorruptHeader { .. })
    ));
    Ok(())
}

#[test]
fn test_future_format_version_is_rejected() -> Result<()> {
    use std::io::{Seek, SeekFrom, Write};

    let dir = tempdir()?;
    let path = dir.path().join("t.tbl");
    TableFile::create(&path, two_column_schema(), HeapPageFactory)?.close()?;

    // The version field sits right after the magic number.
    let mut file = std::fs::OpenOptions::new().write(true).open(&path)?;
    file.seek(SeekFrom::Start(4))?;
    file.write_all(&7u32.to_le_bytes())?;
    drop(file);

    assert!(matches!(
        TableFile::open(&path, HeapPageFactory),
        Err(StorageError::UnsupportedVersion { found: 7 })
    ));
    Ok(())
}

#[test]
fn test_column_name_length_bounds() {
    // 127 UTF-16 units is the longest accepted name.
    let longest = "n".repeat(127);
    assert!(Schema::with_columns(
        4096,
        vec![ColumnDef::new(&longest, DataType::Int, 4)]
    )
    .is_ok());

    let too_long = "n".repeat(128);
    assert!(Schema::with_columns(
        4096,
        vec![ColumnDef::new(&too_long, DataType::Int, 4)]
    )
    .is_err());

    // Characters outside the basic multilingual plane count as two units.
    let surrogate_heavy = "\u{1D465}".repeat(64);
    assert!(Schema::with_columns(
        4096,
        vec![ColumnDef::new(&surrogate_heavy, DataType::Int, 4)]
    )
    .is_err());
}

#[test]
fn test_random_tuples_survive_reopen() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("random.tbl");
    let table = TableFile::create(&path, two_column_schema(), HeapPageFactory)?;
    let page_size = table.page_size() as usize;
    let mut rng = rand::thread_rng();

    let mut expected: Vec<Vec<Vec<u8>>> = Vec::new();
    for _ in 0..8 {
        let mut buffer = vec![0u8; page_size];
        let mut tuples = Vec::new();
        {
            let mut page = table.reserve_page(&mut buffer)?;
            for _ in 0..rng.gen_range(1..20) {
                let mut tuple = vec![0u8; rng.gen_range(1..128)];
                rng.fill_bytes(&mut tuple);
                page.insert_tuple(&tuple)?;
                tuples.push(tuple);
            }
            let number = page.page_number();
            table.write_page(number, page.data())?;
        }
        expected.push(tuples);
    }
    table.close()?;

    let table = TableFile::open(&path, HeapPageFactory)?;
    for (i, tuples) in expected.iter().enumerate() {
        let mut buffer = vec![0u8; page_size];
        let page = table.read_page(PageId(i as u64 + 1), &mut buffer)?;
        for (slot, tuple) in tuples.iter().enumerate() {
            assert_eq!(page.get_tuple(slot as u16)?, &tuple[..]);
        }
    }
    table.close()?;
    Ok(())
}

#[test]
fn test_non_ascii_names_round_trip() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("t.tbl");
    let schema = Schema::with_columns(
        4096,
        vec![
            ColumnDef::new("größe", DataType::Double, 8),
            ColumnDef::new("名前", DataType::VarChar, 64).nullable(),
        ],
    )?;

    TableFile::create(&path, schema.clone(), HeapPageFactory)?.close()?;
    let table = TableFile::open(&path, HeapPageFactory)?;
    assert_eq!(table.schema(), &schema);
    assert_eq!(table.schema().column(0).unwrap().name, "größe");
    assert_eq!(table.schema().column(1).unwrap().name, "名前");
    table.close()?;
    Ok(())
}
