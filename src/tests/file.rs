use crate::*;

fn temp_path(name: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    (dir, path)
}

#[test]
fn round_trip_through_disk() {
    let (_dir, path) = temp_path("values.bin");

    let mut w = BinaryWriter::new(FileHandle::open(&path, "wb").unwrap()).unwrap();
    w.write_string("hello \u{1f603}").unwrap();
    w.write_7bit_encoded_i64(-5).unwrap();
    w.write_f64(core::f64::consts::PI).unwrap();
    w.close().unwrap();
    assert!(w.inner_mut().is_closed());

    let mut r = BinaryReader::new(FileHandle::open(&path, "rb").unwrap()).unwrap();
    assert_eq!(r.read_string().unwrap(), "hello \u{1f603}");
    assert_eq!(r.read_7bit_encoded_i64().unwrap(), -5);
    assert_eq!(r.read_f64().unwrap(), core::f64::consts::PI);
    assert!(r.read_u8().unwrap_err().is_end_of_stream());
    r.close().unwrap();
}

#[test]
fn peek_and_surrogates_on_disk() {
    let (_dir, path) = temp_path("chars.bin");
    std::fs::write(&path, "x\u{1f603}".as_bytes()).unwrap();

    let mut r = BinaryReader::new(FileHandle::open(&path, "r").unwrap()).unwrap();
    assert_eq!(r.peek_char().unwrap(), Some('x' as u16));
    assert_eq!(r.read_char().unwrap(), 'x' as u16);
    assert!(matches!(r.read_char(), Err(Error::SurrogateEncountered)));
    assert_eq!(r.base_file().tell().unwrap(), 1);
    assert_eq!(r.read_chars(2).unwrap(), [0xd83d, 0xde03]);
}

#[test]
fn modes() {
    let (_dir, path) = temp_path("modes.bin");

    let handle = FileHandle::open(&path, "w").unwrap();
    assert!(handle.can_write() && !handle.can_read() && handle.can_seek());
    assert!(matches!(BinaryReader::new(handle), Err(Error::NotReadable)));

    let handle = FileHandle::open(&path, "r").unwrap();
    assert!(handle.can_read() && !handle.can_write());
    assert!(matches!(BinaryWriter::new(handle), Err(Error::NotWritable)));

    let handle = FileHandle::open(&path, "w+b").unwrap();
    assert!(handle.can_read() && handle.can_write());

    assert!(matches!(
        FileHandle::open(&path, "rw"),
        Err(Error::InvalidArgument { param: "mode", .. })
    ));
}

#[test]
fn missing_file() {
    let (_dir, path) = temp_path("missing.bin");
    assert!(matches!(FileHandle::open(&path, "r"), Err(Error::Io(_))));
}

#[test]
fn read_write_mode() {
    let (_dir, path) = temp_path("rw.bin");
    let mut handle = FileHandle::open(&path, "w+").unwrap();

    let mut w = BinaryWriter::with_options(&mut handle, "utf16le", true).unwrap();
    w.write_cstring("ok").unwrap();
    w.close().unwrap();
    drop(w);

    handle.seek(0, SeekOrigin::Begin).unwrap();
    let mut r = BinaryReader::with_options(&mut handle, "utf16le", true).unwrap();
    assert_eq!(r.read_chars(3).unwrap(), [b'o' as u16, b'k' as u16, 0]);
    r.close().unwrap();
    drop(r);
    assert!(!handle.is_closed());

    handle.close().unwrap();
    assert!(handle.is_closed());
    assert_eq!(std::fs::read(&path).unwrap(), [b'o', 0, b'k', 0, 0, 0]);
}

#[test]
fn append() {
    let (_dir, path) = temp_path("append.bin");
    std::fs::write(&path, [1u8, 2]).unwrap();

    let handle = FileHandle::open(&path, "a").unwrap();
    assert!(handle.can_append());
    let mut w = BinaryWriter::new(handle).unwrap();
    w.write_u8(3).unwrap();
    w.close().unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), [1, 2, 3]);
}

#[test]
fn closed_handle() {
    let (_dir, path) = temp_path("closed.bin");
    let mut handle = FileHandle::open(&path, "w+").unwrap();
    handle.close().unwrap();
    handle.close().unwrap();

    let mut buf = [0u8; 1];
    assert!(handle.read(&mut buf).is_err());
    assert!(handle.write(&buf).is_err());
    assert!(handle.tell().is_err());

    // A reader over a closed handle is still created, but every read reports the I/O error.
    let mut r = BinaryReader::new(&mut handle).unwrap();
    assert!(matches!(r.read_u8(), Err(Error::Io(_))));
}

#[test]
fn write_buffering() {
    let (_dir, path) = temp_path("buffered.bin");
    let on_disk = || std::fs::read(&path).unwrap().len();

    let mut handle = FileHandle::open(&path, "w").unwrap();
    assert_eq!(handle.buf_size(), DEFAULT_BUF_SIZE);
    handle.set_buf_size(8).unwrap();
    handle.write(&[1, 2, 3]).unwrap();
    assert_eq!(on_disk(), 0);

    // Does not fit next to the pending bytes, so those go out first.
    handle.write(&[4; 6]).unwrap();
    assert_eq!(on_disk(), 3);
    assert_eq!(handle.tell().unwrap(), 9);
    assert_eq!(on_disk(), 9);

    // Larger than the buffer: written through.
    handle.write(&[5; 8]).unwrap();
    assert_eq!(on_disk(), 17);

    handle.set_buf_size(0).unwrap();
    assert_eq!(handle.buf_size(), 0);
    handle.write(&[6]).unwrap();
    assert_eq!(on_disk(), 18);

    handle.close().unwrap();
    assert!(handle.set_buf_size(16).is_err());
}

#[test]
fn buffered_writes_survive_drop_and_seek() {
    let (_dir, path) = temp_path("dropped.bin");

    let mut handle = FileHandle::open(&path, "w+").unwrap();
    handle.set_buf_size(1024).unwrap();
    let mut w = BinaryWriter::new(&mut handle).unwrap();
    w.write_u32(0x0403_0201).unwrap();
    drop(w);
    handle.seek(0, SeekOrigin::Begin).unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(handle.read(&mut buf).unwrap(), 4);
    assert_eq!(buf, [1, 2, 3, 4]);

    handle.write(&[5, 6]).unwrap();
    drop(handle);
    assert_eq!(std::fs::read(&path).unwrap(), [1, 2, 3, 4, 5, 6]);
}

#[test]
fn boxed_file() {
    let file: Box<dyn BinaryFile> = Box::new(MemoryFile::from_bytes(vec![0x34, 0x12]));
    let mut r = BinaryReader::new(file).unwrap();
    assert_eq!(r.read_u16().unwrap(), 0x1234);
}

#[test]
fn memory_file_seek_errors() {
    let mut file = MemoryFile::from_bytes(vec![1, 2, 3]);
    assert!(file.seek(-1, SeekOrigin::Begin).is_err());
    assert_eq!(file.seek(10, SeekOrigin::Begin).unwrap(), 10);
    let mut buf = [0u8; 4];
    assert_eq!(file.read(&mut buf).unwrap(), 0);

    let state = IoState {
        can_read: true,
        ..IoState::default()
    };
    let mut file = MemoryFile::with_state(vec![1], state);
    assert!(file.seek(0, SeekOrigin::Begin).is_err());
    assert!(file.write(&[1]).is_err());
}
