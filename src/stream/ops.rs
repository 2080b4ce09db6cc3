// src/stream/ops.rs
//! Stream operations: read, write, seek, length, bulk copy, buffer access.
//!
//! The `std::io` traits are the primary interface; the inherent methods
//! here add the operations those traits have no vocabulary for
//! (`set_len`, `to_vec`, `get_buffer`, `copy_to`).

use std::io::{self, Read, Seek, SeekFrom, Write};

use zeroize::Zeroize;

use crate::error::{Result, StreamError};
use crate::events;
use crate::settings::{self, ZeroBufferBehavior};
use crate::stream::core::{SegStream, State};

impl SegStream {
    fn read_impl(&mut self, out: &mut [u8]) -> Result<usize> {
        self.check_open()?;
        if out.is_empty() || self.pos >= self.len {
            return Ok(0);
        }
        let n = out.len().min(self.len - self.pos);
        match &self.state {
            State::Segmented(chain) => chain.read_at(self.pos, &mut out[..n]),
            State::Large(buf) => {
                out[..n].copy_from_slice(&buf.as_slice()[self.pos..self.pos + n]);
            }
            State::Fixed(fixed) => {
                let base = fixed.start + self.pos;
                out[..n].copy_from_slice(&fixed.data[base..base + n]);
            }
            State::Closed => unreachable!(),
        }
        self.pos += n;
        Ok(n)
    }

    fn write_impl(&mut self, data: &[u8]) -> Result<usize> {
        self.check_open()?;
        if data.is_empty() {
            return Ok(0);
        }

        if let State::Fixed(fixed) = &mut self.state {
            let writable = fixed.span.saturating_sub(self.pos);
            if writable == 0 {
                return Err(StreamError::FixedCapacity);
            }
            let n = data.len().min(writable);
            if self.pos > self.len {
                // Seek-past-end gap over previously truncated bytes.
                fixed.data[fixed.start + self.len..fixed.start + self.pos].zeroize();
            }
            let base = fixed.start + self.pos;
            fixed.data[base..base + n].copy_from_slice(&data[..n]);
            self.pos += n;
            if self.pos > self.len {
                self.len = self.pos;
            }
            return Ok(n);
        }

        let end = self
            .pos
            .checked_add(data.len())
            .ok_or(StreamError::CapacityOverflow)?;
        self.grow_to(end)?;
        // A seek-past-end gap in [len, pos) needs no fill: bytes beyond the
        // logical length are kept zero (clean rentals + scrub on shrink).
        match &mut self.state {
            State::Segmented(chain) => chain.write_at(self.pos, data),
            State::Large(buf) => {
                buf.mark_dirty();
                buf.as_mut_slice()[self.pos..end].copy_from_slice(data);
            }
            State::Fixed(_) | State::Closed => unreachable!(),
        }
        self.pos = end;
        if end > self.len {
            self.len = end;
        }
        Ok(data.len())
    }

    fn seek_impl(&mut self, from: SeekFrom) -> Result<u64> {
        self.check_open()?;
        let target: i128 = match from {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.pos as i128 + delta as i128,
            SeekFrom::End(delta) => self.len as i128 + delta as i128,
        };
        if target < 0 {
            return Err(StreamError::NegativeSeek);
        }
        if target > usize::MAX as i128 {
            return Err(StreamError::CapacityOverflow);
        }
        self.pos = target as usize;
        Ok(self.pos as u64)
    }

    /// Sets the logical length.
    ///
    /// Growing zero-fills the newly included bytes (unless the zeroing
    /// behavior is `None`) and may rent more storage, promoting past the
    /// threshold.  Shrinking clamps the position, scrubs the abandoned
    /// range, and releases capacity — demoting a large stream back to
    /// segments once the length falls below half the threshold.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::io::{Read, Seek, SeekFrom, Write};
    /// use segbuf::SegStream;
    ///
    /// let mut stream = SegStream::new();
    /// stream.write_all(&[0xFF; 64])?;
    /// stream.set_len(32)?;
    /// stream.set_len(64)?;
    ///
    /// stream.seek(SeekFrom::Start(32))?;
    /// let mut tail = [0xAA; 32];
    /// stream.read_exact(&mut tail)?;
    /// assert_eq!(tail, [0u8; 32]);
    /// # Ok::<(), std::io::Error>(())
    /// ```
    pub fn set_len(&mut self, n: usize) -> Result<()> {
        self.check_open()?;
        if n == self.len {
            return Ok(());
        }
        let scrub = self.settings.zero_behavior != ZeroBufferBehavior::None;

        if let State::Fixed(fixed) = &mut self.state {
            if n > fixed.span {
                return Err(StreamError::FixedCapacity);
            }
            if n > self.len {
                if scrub {
                    fixed.data[fixed.start + self.len..fixed.start + n].zeroize();
                }
            } else {
                self.pos = self.pos.min(n);
            }
            self.len = n;
            return Ok(());
        }

        if n > self.len {
            self.grow_to(n)?;
            self.len = n;
        } else {
            if scrub {
                match &mut self.state {
                    State::Segmented(chain) => chain.zero_range(n, self.len - n),
                    State::Large(buf) => buf.as_mut_slice()[n..self.len].zeroize(),
                    State::Fixed(_) | State::Closed => unreachable!(),
                }
            }
            self.pos = self.pos.min(n);
            self.len = n;
            self.shrink_for(n);
        }
        Ok(())
    }

    /// Reads one byte, or `None` at the end of the stream.
    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        Ok(match self.read_impl(&mut byte)? {
            0 => None,
            _ => Some(byte[0]),
        })
    }

    /// Writes one byte at the current position.
    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write_impl(&[byte]).map(|_| ())
    }

    /// Ensures capacity for `additional` bytes past the current length.
    ///
    /// May promote to large-buffer mode like any other growth request; the
    /// logical length and position are unchanged.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        self.check_open()?;
        let needed = self
            .len
            .checked_add(additional)
            .ok_or(StreamError::CapacityOverflow)?;
        self.grow_to(needed)
    }

    /// Empties the stream: length and position to zero, capacity released.
    pub fn clear(&mut self) -> Result<()> {
        self.set_len(0)?;
        self.pos = 0;
        Ok(())
    }

    /// Copies everything from the current position to the end into `dest`.
    ///
    /// Storage slices are written directly, in chunks no larger than the
    /// ladder growth unit; the position advances with each chunk, so a
    /// failed write leaves it at the first unwritten byte.
    pub fn copy_to<W: Write>(&mut self, dest: &mut W) -> Result<u64> {
        self.check_open()?;
        let unit = settings::options().large_growth_unit;
        let mut total = 0u64;
        while self.pos < self.len {
            let n = {
                let want = (self.len - self.pos).min(unit);
                let chunk = match &self.state {
                    State::Segmented(chain) => chain.segment_at(self.pos, want),
                    State::Large(buf) => &buf.as_slice()[self.pos..self.pos + want],
                    State::Fixed(fixed) => {
                        let base = fixed.start + self.pos;
                        &fixed.data[base..base + want]
                    }
                    State::Closed => unreachable!(),
                };
                dest.write_all(chunk)?;
                chunk.len()
            };
            self.pos += n;
            total += n as u64;
        }
        Ok(total)
    }

    /// Async variant of [`copy_to`](Self::copy_to).
    ///
    /// Suspends only at writes to the destination; dropping the future
    /// stops further writes without rolling back bytes already emitted.
    #[cfg(feature = "async")]
    pub async fn copy_to_async<W>(&mut self, dest: &mut W) -> Result<u64>
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        use tokio::io::AsyncWriteExt;

        self.check_open()?;
        let unit = settings::options().large_growth_unit;
        let mut total = 0u64;
        while self.pos < self.len {
            let n = {
                let want = (self.len - self.pos).min(unit);
                let chunk = match &self.state {
                    State::Segmented(chain) => chain.segment_at(self.pos, want),
                    State::Large(buf) => &buf.as_slice()[self.pos..self.pos + want],
                    State::Fixed(fixed) => {
                        let base = fixed.start + self.pos;
                        &fixed.data[base..base + want]
                    }
                    State::Closed => unreachable!(),
                };
                dest.write_all(chunk).await?;
                chunk.len()
            };
            self.pos += n;
            total += n as u64;
        }
        Ok(total)
    }

    /// Copies the whole logical content into a freshly allocated vec.
    ///
    /// This is a deliberate allocation outside the pools and is reported
    /// as a warn-level event.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        self.check_open()?;
        let mut out = Vec::new();
        out.try_reserve_exact(self.len)
            .map_err(|_| StreamError::OutOfMemory)?;
        out.resize(self.len, 0);
        match &self.state {
            State::Segmented(chain) => chain.read_at(0, &mut out),
            State::Large(buf) => out.copy_from_slice(&buf.as_slice()[..self.len]),
            State::Fixed(fixed) => {
                out.copy_from_slice(&fixed.data[fixed.start..fixed.start + self.len]);
            }
            State::Closed => unreachable!(),
        }
        events::stream_to_array(self.id, self.len);
        Ok(out)
    }

    /// The stream's contiguous backing span.
    ///
    /// Only fixed streams and streams promoted to a single large buffer
    /// have one; segmented streams fail with
    /// [`StreamError::NoContiguousBuffer`].  The returned span borrows the
    /// stream, so it cannot be held across capacity changes.
    pub fn get_buffer(&self) -> Result<&[u8]> {
        self.check_open()?;
        match &self.state {
            State::Fixed(fixed) => Ok(&fixed.data[fixed.start..fixed.start + fixed.span]),
            State::Large(buf) => Ok(buf.as_slice()),
            State::Segmented(_) => Err(StreamError::NoContiguousBuffer),
            State::Closed => unreachable!(),
        }
    }

    /// Non-failing variant of [`get_buffer`](Self::get_buffer).
    pub fn try_get_buffer(&self) -> Option<&[u8]> {
        self.get_buffer().ok()
    }
}

impl Read for SegStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_impl(buf).map_err(Into::into)
    }
}

impl Write for SegStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_impl(buf).map_err(Into::into)
    }

    /// No-op: the stream is its own destination.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for SegStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.seek_impl(pos).map_err(Into::into)
    }
}
