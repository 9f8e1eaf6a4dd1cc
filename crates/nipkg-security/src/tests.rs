use std::fs;

use nipkg_core::ErrorKind;

use super::*;

const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

#[test]
fn sha256_hex_matches_known_vectors() {
    assert_eq!(sha256_hex(b""), EMPTY_SHA256);
    assert_eq!(sha256_hex(b"abc"), ABC_SHA256);
}

#[test]
fn file_digest_matches_in_memory_digest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("package.zip");
    fs::write(&path, b"abc").expect("must write fixture");

    assert_eq!(sha256_file_hex(&path).expect("must hash"), ABC_SHA256);
    let verified =
        verify_sha256_file(&path, &ABC_SHA256.to_ascii_uppercase()).expect("must verify");
    assert_eq!(verified, ABC_SHA256);
}

#[test]
fn verify_reports_mismatch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("package.zip");
    fs::write(&path, b"abc").expect("must write fixture");

    let err = verify_sha256_file(&path, EMPTY_SHA256).expect_err("digest must not match");
    assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = sha256_file_hex(&dir.path().join("absent.zip")).expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::Io);
}
