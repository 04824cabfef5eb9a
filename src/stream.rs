use crate::command::{Input, Output};
use crate::error::ShellError;
use std::fmt;
use std::io::{self, Cursor, PipeReader, PipeWriter, Read, Result as IoResult, Write};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Memory-backed reader for stages.
///
/// Public so it can be constructed from other modules.
pub struct MemReader {
    cursor: Cursor<Vec<u8>>,
}

impl MemReader {
    /// Create a MemReader that will read from the provided buffer.
    pub fn new(buf: Vec<u8>) -> Self {
        Self {
            cursor: Cursor::new(buf),
        }
    }

    /// A reader that is at EOF from the start.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Read for MemReader {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        self.cursor.read(out)
    }
}

impl Input for MemReader {
    fn into_stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Input>> {
        Err(self)
    }
}

/// Bytes collected by a [`MemWriter`], readable after the writer is gone.
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of everything written so far.
    pub fn bytes(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Everything written so far, lossily decoded as UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    /// Another writer appending to the same buffer.
    pub fn writer(&self) -> MemWriter {
        MemWriter { buf: self.clone() }
    }
}

/// Memory-backed writer for capturing the output of stages.
pub struct MemWriter {
    buf: Captured,
}

impl MemWriter {
    /// Create a writer and return a handle to the bytes it will collect.
    pub fn with_handle() -> (Self, Captured) {
        let buf = Captured::default();
        (Self { buf: buf.clone() }, buf)
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

impl Output for MemWriter {
    fn into_stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Output>> {
        Err(self)
    }
}

/// The interpreter's own standard input.
///
/// Children spawned against it inherit the descriptor instead of reading
/// through a bridge.
pub struct InheritedStdin(io::Stdin);

impl InheritedStdin {
    pub fn new() -> Self {
        Self(io::stdin())
    }
}

impl Default for InheritedStdin {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for InheritedStdin {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.0.read(buf)
    }
}

impl Input for InheritedStdin {
    fn into_stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Input>> {
        Ok(Stdio::inherit())
    }
}

/// Diagnostic stream shared by every stage of a session.
///
/// Cloning is cheap; all clones write to the same sink, one `write` call at a
/// time.
#[derive(Clone)]
pub struct Diagnostics {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
    inherited: bool,
}

impl Diagnostics {
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(sink))),
            inherited: false,
        }
    }

    /// Diagnostics going to the process's standard error.
    pub fn stderr() -> Self {
        Self {
            inherited: true,
            ..Self::new(io::stderr())
        }
    }

    /// Standard error for a child process, when the sink is an OS descriptor
    /// the child can share. `None` means the child's stderr must be copied in.
    pub fn child_stdio(&self) -> Option<Stdio> {
        self.inherited.then(Stdio::inherit)
    }

    /// Diagnostics collected in memory, for tests and embedding.
    pub fn captured() -> (Self, Captured) {
        let (writer, handle) = MemWriter::with_handle();
        (Self::new(writer), handle)
    }
}

impl Diagnostics {
    fn lock(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Whole messages are written under one lock, so lines from concurrent
/// stages never interleave.
impl Write for Diagnostics {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.lock().write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> IoResult<()> {
        self.lock().write_all(buf)
    }

    fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> IoResult<()> {
        let message = fmt::format(args);
        self.write_all(message.as_bytes())
    }

    fn flush(&mut self) -> IoResult<()> {
        self.lock().flush()
    }
}

/// Create a fresh kernel pipe.
///
/// Each end closes its descriptor when dropped. Dropping the writer is the
/// only way the reader ever sees EOF, so a producer must not keep a writer
/// alive past the end of its output.
pub fn create_pipe() -> Result<(PipeReader, PipeWriter), ShellError> {
    let (reader, writer) = io::pipe().map_err(ShellError::Pipe)?;
    log::trace!("created pipe");
    Ok((reader, writer))
}

/// Move every byte from `input` to `output` in [`DEFAULT_BLOCK_SIZE`] chunks.
///
/// [`DEFAULT_BLOCK_SIZE`]: crate::command::DEFAULT_BLOCK_SIZE
pub fn pump(input: &mut dyn Input, output: &mut dyn Write) -> IoResult<u64> {
    let mut total = 0;
    loop {
        let chunk = input.read_chunk(crate::command::DEFAULT_BLOCK_SIZE)?;
        if chunk.is_empty() {
            output.flush()?;
            return Ok(total);
        }
        output.write_all(&chunk)?;
        total += chunk.len() as u64;
    }
}
