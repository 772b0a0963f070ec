//! I/O mode bindings for sessions.
//!
//! A session reads from (or writes to) one of three places:
//!
//! - **Memory**: a caller-owned byte slice. Decoding needs a non-empty
//!   slice; encoding may pass `None` to let the session grow its own buffer.
//! - **Stream**: a caller-owned `Read + Seek` / `Write + Seek` handle. An
//!   input stream is returned to its position at activation; an output
//!   stream is left after the written bytes so further images can follow.
//! - **Path**: a file name. The session keeps its own copy of the path and
//!   opens the file only while started.

use std::ffi::OsString;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::encoder::FinishStatus;
use crate::error::{Result, SessionError};

/// Seekable byte source.
pub trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send + ?Sized> ReadSeek for T {}

/// Seekable byte sink.
pub trait WriteSeek: Write + Seek + Send {}
impl<T: Write + Seek + Send + ?Sized> WriteSeek for T {}

/// Which kind of binding is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    /// Caller byte buffer.
    Memory,
    /// Caller stream handle.
    Stream,
    /// File path.
    Path,
}

impl fmt::Display for IoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IoMode::Memory => "memory",
            IoMode::Stream => "stream",
            IoMode::Path => "path",
        })
    }
}

/// Decoder input.
pub enum Input<'io> {
    /// Encoded bytes.
    Memory(&'io [u8]),
    /// Stream positioned at the start of the encoded image.
    Stream(&'io mut dyn ReadSeek),
    /// File containing the encoded image.
    Path(&'io Path),
}

/// Encoder output.
pub enum Output<'io> {
    /// Caller buffer, or `None` to use a session-owned buffer.
    Memory(Option<&'io mut [u8]>),
    /// Stream receiving the encoded image at its current position.
    Stream(&'io mut dyn WriteSeek),
    /// File to create or truncate.
    Path(&'io Path),
}

const PATH_ALIGN: usize = 32;

/// Owned, grow-only copy of a path.
#[derive(Debug, Default)]
struct PathCache {
    buf: OsString,
}

impl PathCache {
    fn set(&mut self, path: &Path) -> Result<()> {
        let len = path.as_os_str().len();
        if len == 0 {
            return Err(SessionError::InvalidParameter("empty path".into()));
        }

        let want = (len + PATH_ALIGN).next_multiple_of(PATH_ALIGN);
        self.buf.clear();
        if self.buf.capacity() < want {
            self.buf.try_reserve_exact(want)?;
        }
        self.buf.push(path.as_os_str());
        Ok(())
    }

    fn path(&self) -> &Path {
        Path::new(&self.buf)
    }

    fn capacity(&self) -> usize {
        self.buf.capacity()
    }
}

fn save_position<S: Seek + ?Sized>(stream: &mut S) -> Result<u64> {
    stream
        .stream_position()
        .map_err(|e| SessionError::PositionQueryFailed(e.to_string()))
}

fn restore_position<S: Seek + ?Sized>(stream: &mut S, saved: u64) {
    if let Err(e) = stream.seek(SeekFrom::Start(saved)) {
        log::warn!("failed to restore stream position {}: {}", saved, e);
    }
}

fn not_active() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "binding is not active")
}

enum InputState<'io> {
    Unconfigured,
    Memory(&'io [u8]),
    Stream {
        stream: &'io mut dyn ReadSeek,
        saved: Option<u64>,
    },
    Path {
        file: Option<File>,
    },
}

/// Input side of a decoder session.
pub struct InputBinding<'io> {
    state: InputState<'io>,
    path: PathCache,
    staged: Vec<u8>,
    loaded: bool,
}

impl Default for InputBinding<'_> {
    fn default() -> Self {
        Self {
            state: InputState::Unconfigured,
            path: PathCache::default(),
            staged: Vec::new(),
            loaded: false,
        }
    }
}

impl<'io> InputBinding<'io> {
    /// Create an unconfigured binding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configured mode, if any.
    pub fn mode(&self) -> Option<IoMode> {
        match self.state {
            InputState::Unconfigured => None,
            InputState::Memory(_) => Some(IoMode::Memory),
            InputState::Stream { .. } => Some(IoMode::Stream),
            InputState::Path { .. } => Some(IoMode::Path),
        }
    }

    /// Replace the binding. On error the binding is left unconfigured.
    pub fn configure(&mut self, input: Input<'io>) -> Result<()> {
        self.deactivate();
        self.state = InputState::Unconfigured;
        match input {
            Input::Memory(data) => {
                if data.is_empty() {
                    return Err(SessionError::InvalidParameter("empty input buffer".into()));
                }
                self.state = InputState::Memory(data);
            }
            Input::Stream(stream) => {
                self.state = InputState::Stream { stream, saved: None };
            }
            Input::Path(path) => self.configure_path(path)?,
        }
        Ok(())
    }

    /// Bind to a file path. The path is copied.
    pub fn configure_path(&mut self, path: &Path) -> Result<()> {
        self.deactivate();
        self.state = InputState::Unconfigured;
        self.path.set(path)?;
        self.state = InputState::Path { file: None };
        Ok(())
    }

    /// Prepare the source for the codec.
    pub fn activate(&mut self) -> Result<()> {
        self.loaded = false;
        match &mut self.state {
            InputState::Unconfigured => Err(SessionError::Unconfigured),
            InputState::Memory(_) => Ok(()),
            InputState::Stream { stream, saved } => {
                *saved = Some(save_position(&mut **stream)?);
                Ok(())
            }
            InputState::Path { file } => {
                let opened = File::open(self.path.path()).map_err(|e| {
                    SessionError::OpenFailed(format!("{}: {}", self.path.path().display(), e))
                })?;
                *file = Some(opened);
                Ok(())
            }
        }
    }

    /// Bytes of the encoded image. Streams and files are read once per activation.
    pub fn input(&mut self) -> io::Result<&[u8]> {
        match &mut self.state {
            InputState::Unconfigured => return Err(not_active()),
            InputState::Memory(data) => return Ok(*data),
            InputState::Stream { stream, .. } => {
                if !self.loaded {
                    self.staged.clear();
                    stream.read_to_end(&mut self.staged)?;
                }
            }
            InputState::Path { file } => {
                let file = file.as_mut().ok_or_else(not_active)?;
                if !self.loaded {
                    self.staged.clear();
                    file.read_to_end(&mut self.staged)?;
                }
            }
        }
        self.loaded = true;
        Ok(&self.staged)
    }

    /// Undo [`InputBinding::activate`]. Safe to call when not active.
    pub fn deactivate(&mut self) {
        self.loaded = false;
        match &mut self.state {
            InputState::Unconfigured | InputState::Memory(_) => {}
            InputState::Stream { stream, saved } => {
                if let Some(pos) = saved.take() {
                    restore_position(&mut **stream, pos);
                }
            }
            InputState::Path { file } => {
                file.take();
            }
        }
    }
}

enum OutputState<'io> {
    Unconfigured,
    Memory(Option<&'io mut [u8]>),
    Stream(&'io mut dyn WriteSeek),
    Path {
        file: Option<File>,
    },
}

/// Output side of an encoder session.
pub struct OutputBinding<'io> {
    state: OutputState<'io>,
    path: PathCache,
}

impl Default for OutputBinding<'_> {
    fn default() -> Self {
        Self {
            state: OutputState::Unconfigured,
            path: PathCache::default(),
        }
    }
}

impl<'io> OutputBinding<'io> {
    /// Create an unconfigured binding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configured mode, if any.
    pub fn mode(&self) -> Option<IoMode> {
        match self.state {
            OutputState::Unconfigured => None,
            OutputState::Memory(_) => Some(IoMode::Memory),
            OutputState::Stream(_) => Some(IoMode::Stream),
            OutputState::Path { .. } => Some(IoMode::Path),
        }
    }

    /// Replace the binding. On error the binding is left unconfigured.
    pub fn configure(&mut self, output: Output<'io>) -> Result<()> {
        self.deactivate();
        self.state = OutputState::Unconfigured;
        match output {
            Output::Memory(buf) => {
                let buf = buf.filter(|b| !b.is_empty());
                self.state = OutputState::Memory(buf);
            }
            Output::Stream(stream) => {
                self.state = OutputState::Stream(stream);
            }
            Output::Path(path) => self.configure_path(path)?,
        }
        Ok(())
    }

    /// Bind to a file path. The path is copied.
    pub fn configure_path(&mut self, path: &Path) -> Result<()> {
        self.deactivate();
        self.state = OutputState::Unconfigured;
        self.path.set(path)?;
        self.state = OutputState::Path { file: None };
        Ok(())
    }

    /// Prepare the destination for the codec.
    pub fn activate(&mut self) -> Result<()> {
        match &mut self.state {
            OutputState::Unconfigured => Err(SessionError::Unconfigured),
            OutputState::Memory(_) => Ok(()),
            OutputState::Stream(stream) => {
                let at = save_position(&mut **stream)?;
                log::debug!("writing stream output at offset {}", at);
                Ok(())
            }
            OutputState::Path { file } => {
                let opened = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(self.path.path())
                    .map_err(|e| {
                        SessionError::OpenFailed(format!("{}: {}", self.path.path().display(), e))
                    })?;
                *file = Some(opened);
                Ok(())
            }
        }
    }

    /// Writer for the finished stream. Memory mode spills into `spill`.
    pub fn sink<'a>(&'a mut self, spill: &'a mut Vec<u8>) -> io::Result<Sink<'a>> {
        match &mut self.state {
            OutputState::Unconfigured => Err(not_active()),
            OutputState::Memory(buf) => Ok(Sink::Memory(MemorySink::new(buf.as_deref_mut(), spill))),
            OutputState::Stream(stream) => Ok(Sink::Stream(&mut **stream)),
            OutputState::Path { file } => file.as_mut().map(Sink::File).ok_or_else(not_active),
        }
    }

    /// Undo [`OutputBinding::activate`]. Safe to call when not active.
    pub fn deactivate(&mut self) {
        match &mut self.state {
            OutputState::Unconfigured | OutputState::Memory(_) => {}
            OutputState::Stream(stream) => {
                if let Err(e) = stream.flush() {
                    log::warn!("failed to flush output stream: {}", e);
                }
            }
            OutputState::Path { file } => {
                if let Some(mut f) = file.take() {
                    if let Err(e) = f.flush() {
                        log::warn!("failed to flush {}: {}", self.path.path().display(), e);
                    }
                }
            }
        }
    }
}

/// Memory destination: the caller's slice first, then the session buffer.
pub struct MemorySink<'a> {
    caller: Option<&'a mut [u8]>,
    filled: usize,
    spill: &'a mut Vec<u8>,
    spilled: bool,
}

impl<'a> MemorySink<'a> {
    fn new(caller: Option<&'a mut [u8]>, spill: &'a mut Vec<u8>) -> Self {
        spill.clear();
        let spilled = caller.is_none();
        Self {
            caller,
            filled: 0,
            spill,
            spilled,
        }
    }
}

impl Write for MemorySink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.spilled {
            self.spill.try_reserve(buf.len()).map_err(io::Error::other)?;
            self.spill.extend_from_slice(buf);
            return Ok(buf.len());
        }

        let caller = self.caller.as_deref_mut().unwrap_or_default();
        let room = caller.len() - self.filled;
        let n = room.min(buf.len());
        caller[self.filled..self.filled + n].copy_from_slice(&buf[..n]);
        self.filled += n;
        if n < buf.len() {
            let rest = &buf[n..];
            self.spill
                .try_reserve(self.filled + rest.len())
                .map_err(io::Error::other)?;
            self.spill.extend_from_slice(&caller[..self.filled]);
            self.spill.extend_from_slice(rest);
            self.spilled = true;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Destination handed to the compressor at finish.
pub enum Sink<'a> {
    /// Memory mode.
    Memory(MemorySink<'a>),
    /// Stream mode.
    Stream(&'a mut dyn WriteSeek),
    /// Path mode.
    File(&'a mut File),
}

impl Sink<'_> {
    /// Where `written` bytes ended up.
    pub fn status(&self, written: u64) -> FinishStatus {
        match self {
            Sink::Memory(m) if m.spilled => FinishStatus::Buffered(m.spill.len()),
            Sink::Memory(m) => FinishStatus::InPlace(m.filled),
            Sink::Stream(_) | Sink::File(_) => FinishStatus::Written(written),
        }
    }
}

impl Write for Sink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Memory(m) => m.write(buf),
            Sink::Stream(s) => s.write(buf),
            Sink::File(f) => f.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Memory(m) => m.flush(),
            Sink::Stream(s) => s.flush(),
            Sink::File(f) => f.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_path_cache_grows_aligned() {
        let mut cache = PathCache::default();
        cache.set(Path::new("a.jpg")).unwrap();
        assert!(cache.capacity() >= 64);
        assert_eq!(cache.path(), Path::new("a.jpg"));

        let cap = cache.capacity();
        cache.set(Path::new("b.jpg")).unwrap();
        assert_eq!(cache.capacity(), cap);
        assert_eq!(cache.path(), Path::new("b.jpg"));
    }

    #[test]
    fn test_input_rejects_empty() {
        let mut binding = InputBinding::new();
        assert!(matches!(
            binding.configure(Input::Memory(&[])),
            Err(SessionError::InvalidParameter(_))
        ));
        assert!(binding.mode().is_none());

        assert!(binding.configure(Input::Memory(&[1, 2])).is_ok());
        assert!(binding.configure(Input::Path(Path::new(""))).is_err());
        assert!(binding.mode().is_none());
    }

    #[test]
    fn test_stream_position_restored() {
        let mut cursor = Cursor::new(vec![9u8, 1, 2, 3]);
        cursor.set_position(1);
        {
            let mut binding = InputBinding::new();
            binding.configure(Input::Stream(&mut cursor)).unwrap();
            binding.activate().unwrap();
            assert_eq!(binding.input().unwrap(), &[1, 2, 3]);
            binding.deactivate();
        }
        assert_eq!(cursor.position(), 1);
    }

    #[test]
    fn test_path_opened_on_activate() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.jpg");

        let mut binding = InputBinding::new();
        binding.configure_path(&missing).unwrap();
        assert_eq!(binding.mode(), Some(IoMode::Path));
        assert!(matches!(binding.activate(), Err(SessionError::OpenFailed(_))));

        std::fs::write(&missing, b"abc").unwrap();
        binding.activate().unwrap();
        assert_eq!(binding.input().unwrap(), b"abc");
        binding.deactivate();
        assert!(binding.input().is_err());
    }

    #[test]
    fn test_memory_sink_spills() {
        let mut caller = [0u8; 4];
        let mut spill = Vec::new();
        let mut sink = MemorySink::new(Some(&mut caller[..]), &mut spill);
        sink.write_all(b"ab").unwrap();
        sink.write_all(b"cdef").unwrap();
        assert!(sink.spilled);
        drop(sink);
        assert_eq!(&caller, b"abcd");
        assert_eq!(spill, b"abcdef");
    }

    #[test]
    fn test_memory_sink_in_place() {
        let mut caller = [0u8; 8];
        let mut spill = vec![1, 2, 3];
        let mut sink = MemorySink::new(Some(&mut caller[..]), &mut spill);
        sink.write_all(b"abc").unwrap();
        assert_eq!(Sink::Memory(sink).status(3), FinishStatus::InPlace(3));
        assert!(spill.is_empty());
    }

    #[test]
    fn test_output_empty_buffer_means_auto() {
        let mut empty: [u8; 0] = [];
        let mut binding = OutputBinding::new();
        binding.configure(Output::Memory(Some(&mut empty[..]))).unwrap();
        binding.activate().unwrap();
        let mut spill = Vec::new();
        let mut sink = binding.sink(&mut spill).unwrap();
        sink.write_all(b"xyz").unwrap();
        assert_eq!(sink.status(3), FinishStatus::Buffered(3));
    }
}
