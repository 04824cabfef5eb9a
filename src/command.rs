use std::fs::File;
use std::io::{self, ErrorKind, PipeReader, PipeWriter, Read, Write};
use std::process::Stdio;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Size of a single chunk moved between streams.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Readable end of a stage.
///
/// An input is either backed by an OS descriptor (pipe end, file, inherited
/// terminal) or lives in memory. Only the former can be handed to a child
/// process directly; [`Input::into_stdio`] gives in-memory inputs back so the
/// caller can bridge them through a pipe instead.
pub trait Input: Read + Send {
    /// Convert this input into a [`Stdio`] handle for `std::process::Command`,
    /// or return it unchanged when it has no OS descriptor.
    fn into_stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Input>>;

    /// Read at most `max` bytes. An empty result means the producer is done.
    fn read_chunk(&mut self, max: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0; max];
        let n = loop {
            match self.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        buf.truncate(n);
        Ok(buf)
    }
}

/// Writable end of a stage.
///
/// Writes go through [`Write::write_all`], which blocks until every byte is
/// accepted by the other side.
pub trait Output: Write + Send {
    /// Convert this output into a [`Stdio`] handle for `std::process::Command`,
    /// or return it unchanged when it has no OS descriptor.
    fn into_stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Output>>;
}

macro_rules! os_input {
    ($($ty:ty),*) => {$(
        impl Input for $ty {
            fn into_stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Input>> {
                Ok((*self).into())
            }
        }
    )*};
}

macro_rules! os_output {
    ($($ty:ty),*) => {$(
        impl Output for $ty {
            fn into_stdio(self: Box<Self>) -> Result<Stdio, Box<dyn Output>> {
                Ok((*self).into())
            }
        }
    )*};
}

os_input!(File, PipeReader);
os_output!(File, PipeWriter, io::Stdout, io::Stderr);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemReader;

    #[test]
    fn read_chunk_is_bounded_and_signals_eof() {
        let mut input = MemReader::new(b"abcdef".to_vec());

        assert_eq!(input.read_chunk(4).unwrap(), b"abcd");
        assert_eq!(input.read_chunk(4).unwrap(), b"ef");
        assert!(input.read_chunk(4).unwrap().is_empty());
    }

    #[test]
    fn memory_endpoints_are_given_back() {
        let input: Box<dyn Input> = Box::new(MemReader::new(b"x".to_vec()));
        let mut back = input.into_stdio().err().expect("in-memory input has no descriptor");
        assert_eq!(back.read_chunk(8).unwrap(), b"x");
    }

    #[test]
    fn pipe_endpoints_convert_to_stdio() {
        let (reader, writer) = std::io::pipe().unwrap();
        let input: Box<dyn Input> = Box::new(reader);
        let output: Box<dyn Output> = Box::new(writer);
        assert!(input.into_stdio().is_ok());
        assert!(output.into_stdio().is_ok());
    }
}
