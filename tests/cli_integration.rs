use std::io::Write;
use std::process::{Command, Stdio};
use tempfile::tempdir;

fn bin() -> String {
    env!("CARGO_BIN_EXE_vcdelta").to_string()
}

#[test]
fn cli_encode_decode_roundtrip() {
    let dir = tempdir().unwrap();
    let dictionary = dir.path().join("dictionary.bin");
    let target = dir.path().join("target.bin");
    let delta = dir.path().join("delta.vcdiff");
    let output = dir.path().join("output.bin");

    let dict_bytes: Vec<u8> = (0..5000u32).map(|i| (i * 7 % 253) as u8).collect();
    let mut target_bytes = dict_bytes[1000..4000].to_vec();
    target_bytes.extend_from_slice(b"appended text");
    std::fs::write(&dictionary, &dict_bytes).unwrap();
    std::fs::write(&target, &target_bytes).unwrap();

    let st = Command::new(bin())
        .args(["encode", "--interleaved", "--checksum", "--dictionary"])
        .arg(&dictionary)
        .arg(&target)
        .arg(&delta)
        .status()
        .unwrap();
    assert!(st.success());
    assert!(std::fs::metadata(&delta).unwrap().len() < target_bytes.len() as u64);

    let st = Command::new(bin())
        .args(["decode", "-d"])
        .arg(&dictionary)
        .arg("--input")
        .arg(&delta)
        .arg("--output")
        .arg(&output)
        .status()
        .unwrap();
    assert!(st.success());
    assert_eq!(std::fs::read(&output).unwrap(), target_bytes);
}

#[test]
fn cli_stdin_to_stdout() {
    let mut child = Command::new(bin())
        .arg("encode")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"piped through stdin")
        .unwrap();
    let encoded = child.wait_with_output().unwrap();
    assert!(encoded.status.success());
    assert_eq!(&encoded.stdout[..3], &[0xD6, 0xC3, 0xC4]);

    let mut child = Command::new(bin())
        .arg("decode")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(&encoded.stdout)
        .unwrap();
    let decoded = child.wait_with_output().unwrap();
    assert!(decoded.status.success());
    assert_eq!(decoded.stdout, b"piped through stdin");
}

#[test]
fn cli_refuses_to_overwrite_without_force() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.bin");
    let output = dir.path().join("out.vcdiff");
    std::fs::write(&input, b"payload").unwrap();
    std::fs::write(&output, b"existing").unwrap();

    let out = Command::new(bin())
        .arg("encode")
        .arg(&input)
        .arg(&output)
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("vcdelta:"));
    assert_eq!(std::fs::read(&output).unwrap(), b"existing");

    let st = Command::new(bin())
        .args(["-f", "encode"])
        .arg(&input)
        .arg(&output)
        .status()
        .unwrap();
    assert!(st.success());
}

#[test]
fn cli_decode_reports_corrupt_delta() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("bad.vcdiff");
    let output = dir.path().join("out.bin");
    std::fs::write(&input, b"definitely not vcdiff").unwrap();

    let out = Command::new(bin())
        .arg("decode")
        .arg(&input)
        .arg(&output)
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("decode error"));
}

#[test]
fn cli_small_buffer_makes_many_windows() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.bin");
    let delta = dir.path().join("out.vcdiff");
    let output = dir.path().join("roundtrip.bin");
    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 241) as u8).collect();
    std::fs::write(&input, &data).unwrap();

    let out = Command::new(bin())
        .args(["-v", "encode", "--buffer-size", "1K"])
        .arg(&input)
        .arg(&delta)
        .output()
        .unwrap();
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("windows: 10"));

    let st = Command::new(bin())
        .args(["decode", "--max-target-window-size", "1K"])
        .arg(&delta)
        .arg(&output)
        .status()
        .unwrap();
    assert!(st.success());
    assert_eq!(std::fs::read(&output).unwrap(), data);
}
