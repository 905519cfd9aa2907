//! Byte-transfer primitives over positioned file I/O.
//!
//! The kernel may complete fewer bytes than requested in a single call, so
//! every transfer here loops until the full extent is moved. The vectored
//! variants perform one scatter/gather call over a run of equally sized
//! buffers and, after a partial transfer, resume from the first incomplete
//! buffer: with every buffer exactly `chunk_size` bytes, the resumption
//! index is `transferred / chunk_size` and the in-buffer offset is
//! `transferred % chunk_size`.

use std::fs::File;
use std::io::{self, ErrorKind, IoSlice, IoSliceMut};
use std::os::unix::fs::FileExt;

use nix::errno::Errno;
use nix::libc::off_t;
use nix::sys::uio::{preadv, pwritev};

fn vectored_offset(base: u64, transferred: usize) -> io::Result<off_t> {
    off_t::try_from(base + transferred as u64)
        .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "file offset exceeds off_t range"))
}

/// Read exactly `buf.len()` bytes at `offset`, or fail.
///
/// A zero-length transfer before the buffer is filled means the file ends
/// prematurely and is reported as `UnexpectedEof`.
pub fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    let mut total = 0_usize;
    while total < buf.len() {
        match file.read_at(&mut buf[total..], offset + total as u64) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("premature end of file: {} of {} bytes read", total, buf.len()),
                ));
            }
            Ok(n) => total += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Write all of `buf` at `offset`, resuming after partial transfers.
pub fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    let mut total = 0_usize;
    while total < buf.len() {
        match file.write_at(&buf[total..], offset + total as u64) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    "positioned write returned 0 bytes",
                ));
            }
            Ok(n) => total += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Scatter-read `bufs.len() * chunk_size` bytes starting at `offset`.
///
/// Every buffer must be exactly `chunk_size` bytes; the caller validates
/// this, we only debug-assert it here.
pub fn read_exact_vectored_at(
    file: &File,
    bufs: &mut [&mut [u8]],
    chunk_size: usize,
    offset: u64,
) -> io::Result<()> {
    debug_assert!(bufs.iter().all(|b| b.len() == chunk_size));
    let total = bufs.len() * chunk_size;
    let mut transferred = 0_usize;
    while transferred < total {
        let skip = transferred / chunk_size;
        let within = transferred % chunk_size;
        let mut iov: Vec<IoSliceMut<'_>> = Vec::with_capacity(bufs.len() - skip);
        for (i, buf) in bufs[skip..].iter_mut().enumerate() {
            let slice = if i == 0 {
                &mut buf[within..]
            } else {
                &mut buf[..]
            };
            iov.push(IoSliceMut::new(slice));
        }
        match preadv(file, &mut iov, vectored_offset(offset, transferred)?) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!(
                        "premature end of file: {} of {} bytes read",
                        transferred, total
                    ),
                ));
            }
            Ok(n) => transferred += n,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Gather-write all buffers starting at `offset`.
pub fn write_all_vectored_at(
    file: &File,
    bufs: &[&[u8]],
    chunk_size: usize,
    offset: u64,
) -> io::Result<()> {
    debug_assert!(bufs.iter().all(|b| b.len() == chunk_size));
    let total = bufs.len() * chunk_size;
    let mut transferred = 0_usize;
    while transferred < total {
        let skip = transferred / chunk_size;
        let within = transferred % chunk_size;
        let mut iov: Vec<IoSlice<'_>> = Vec::with_capacity(bufs.len() - skip);
        for (i, buf) in bufs[skip..].iter().enumerate() {
            let slice = if i == 0 { &buf[within..] } else { &buf[..] };
            iov.push(IoSlice::new(slice));
        }
        match pwritev(file, &iov, vectored_offset(offset, transferred)?) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    "positioned vectored write returned 0 bytes",
                ));
            }
            Ok(n) => transferred += n,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use tempfile::tempdir;

    fn open_temp(name: &str) -> (tempfile::TempDir, File) {
        let dir = tempdir().unwrap();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(dir.path().join(name))
            .unwrap();
        (dir, file)
    }

    #[test]
    fn test_write_read_at_round_trip() {
        let (_dir, file) = open_temp("simple.bin");
        write_all_at(&file, b"hello positioned io", 100).unwrap();

        let mut buf = [0u8; 19];
        read_exact_at(&file, &mut buf, 100).unwrap();
        assert_eq!(&buf, b"hello positioned io");
    }

    #[test]
    fn test_read_past_end_fails() {
        let (_dir, file) = open_temp("short.bin");
        write_all_at(&file, b"abc", 0).unwrap();

        let mut buf = [0u8; 8];
        let err = read_exact_at(&file, &mut buf, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_vectored_round_trip() {
        let (_dir, file) = open_temp("vectored.bin");
        let chunk = 256;

        let a = vec![0xAA_u8; chunk];
        let b = vec![0xBB_u8; chunk];
        let c = vec![0xCC_u8; chunk];
        write_all_vectored_at(&file, &[&a, &b, &c], chunk, 512).unwrap();

        let mut ra = vec![0u8; chunk];
        let mut rb = vec![0u8; chunk];
        let mut rc = vec![0u8; chunk];
        {
            let mut bufs: Vec<&mut [u8]> = vec![&mut ra, &mut rb, &mut rc];
            read_exact_vectored_at(&file, &mut bufs, chunk, 512).unwrap();
        }
        assert!(ra.iter().all(|&x| x == 0xAA));
        assert!(rb.iter().all(|&x| x == 0xBB));
        assert!(rc.iter().all(|&x| x == 0xCC));
    }

    #[test]
    fn test_vectored_matches_plain_reads() {
        let (_dir, file) = open_temp("equiv.bin");
        let chunk = 128;
        let data: Vec<u8> = (0..3 * chunk).map(|i| (i % 251) as u8).collect();
        write_all_at(&file, &data, 0).unwrap();

        let mut p0 = vec![0u8; chunk];
        let mut p1 = vec![0u8; chunk];
        let mut p2 = vec![0u8; chunk];
        {
            let mut bufs: Vec<&mut [u8]> = vec![&mut p0, &mut p1, &mut p2];
            read_exact_vectored_at(&file, &mut bufs, chunk, 0).unwrap();
        }

        let mut single = vec![0u8; chunk];
        for (i, expected) in [&p0, &p1, &p2].into_iter().enumerate() {
            read_exact_at(&file, &mut single, (i * chunk) as u64).unwrap();
            assert_eq!(&single, expected);
        }
    }

    #[test]
    fn test_vectored_read_past_end_fails() {
        let (_dir, file) = open_temp("vec_short.bin");
        write_all_at(&file, &[1u8; 100], 0).unwrap();

        let mut a = vec![0u8; 128];
        let mut b = vec![0u8; 128];
        let mut bufs: Vec<&mut [u8]> = vec![&mut a, &mut b];
        let err = read_exact_vectored_at(&file, &mut bufs, 128, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }
}
