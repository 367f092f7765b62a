use std::io::{self, Read, Write};

/// Host side of the two I/O primitives a compiled program calls.
pub trait IoHandler {
    fn write_byte(&mut self, byte: u8) -> io::Result<()>;

    fn read_byte(&mut self) -> io::Result<u8>;

    /// Called before a run returns, so buffered output reaches its sink.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Binds the I/O primitives to a byte stream pair. End of input reads as 0.
///
/// Output is flushed before every read and when the run ends, not per byte.
#[derive(Debug)]
pub struct StreamIo<R, W> {
    input: R,
    output: W,
}

impl<R: Read, W: Write> StreamIo<R, W> {
    pub fn new(input: R, output: W) -> Self {
        StreamIo { input, output }
    }
}

impl StreamIo<io::Stdin, io::Stdout> {
    pub fn stdio() -> Self {
        StreamIo::new(io::stdin(), io::stdout())
    }
}

impl<R: Read, W: Write> IoHandler for StreamIo<R, W> {
    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.output.write_all(&[byte])
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        // a prompt must be visible before the program blocks on input
        self.output.flush()?;
        let mut buf = [0u8];
        match self.input.read_exact(&mut buf) {
            Ok(()) => Ok(buf[0]),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}
