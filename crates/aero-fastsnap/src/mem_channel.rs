use std::io::{self, IoSlice, IoSliceMut, Read, Write};

use tracing::trace;

use crate::buffer::SnapshotBuffer;
use crate::channel::{IoChannel, Readiness};
use crate::error::Result;
use crate::watch::{IoCondition, ReadinessWatch};

/// I/O channel over a borrowed [`SnapshotBuffer`].
///
/// Reads stop at the buffer's capacity and report a short count. Writes are not checked against
/// the capacity: the session that sized the buffer guarantees they fit, and an overrun is a bug in
/// that sizing (it trips a debug assertion, and the slice bounds check in every build).
///
/// Memory copies never block, so blocking mode and close are no-ops and every watch is ready for
/// reading and writing as soon as it is created.
#[derive(Debug)]
pub struct MemoryChannel<'a> {
    buf: &'a mut SnapshotBuffer,
}

impl<'a> MemoryChannel<'a> {
    pub fn new(buf: &'a mut SnapshotBuffer) -> Self {
        trace!(
            capacity = buf.capacity(),
            pos = buf.pos(),
            "memory channel opened"
        );
        Self { buf }
    }

    pub fn buffer(&self) -> &SnapshotBuffer {
        &*self.buf
    }

    pub fn pos(&self) -> usize {
        self.buf.pos()
    }

    fn read_segments(&mut self, bufs: &mut [IoSliceMut<'_>]) -> usize {
        let capacity = self.buf.capacity();
        let mut total = 0;
        for seg in bufs.iter_mut() {
            let pos = self.buf.pos();
            if pos >= capacity {
                break;
            }
            let want = seg.len().min(capacity - pos);
            seg[..want].copy_from_slice(&self.buf.as_slice()[pos..pos + want]);
            self.buf.set_pos(pos + want);
            total += want;
        }
        total
    }

    fn write_segments(&mut self, bufs: &[IoSlice<'_>]) -> usize {
        let mut total = 0;
        for seg in bufs {
            // An empty segment copies nothing, even with the cursor past capacity.
            if seg.is_empty() {
                continue;
            }
            let pos = self.buf.pos();
            let end = pos.saturating_add(seg.len());
            debug_assert!(
                end <= self.buf.capacity(),
                "snapshot write overruns buffer: pos={pos} len={} capacity={}",
                seg.len(),
                self.buf.capacity()
            );
            self.buf.data_mut()[pos..end].copy_from_slice(seg);
            self.buf.set_pos(end);
            total += seg.len();
        }
        total
    }
}

impl Readiness for MemoryChannel<'_> {
    fn poll_ready(&self, condition: IoCondition) -> IoCondition {
        condition & (IoCondition::IN | IoCondition::OUT)
    }
}

impl IoChannel for MemoryChannel<'_> {
    type Watch = ReadinessWatch;

    fn readv(&mut self, bufs: &mut [IoSliceMut<'_>]) -> Result<usize> {
        Ok(self.read_segments(bufs))
    }

    fn writev(&mut self, bufs: &[IoSlice<'_>]) -> Result<usize> {
        Ok(self.write_segments(bufs))
    }

    fn set_blocking(&mut self, _enabled: bool) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // The buffer belongs to the session; nothing to release here.
        Ok(())
    }

    fn create_watch(&self, condition: IoCondition) -> ReadinessWatch {
        ReadinessWatch::new(condition)
    }
}

impl Read for MemoryChannel<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_segments(&mut [IoSliceMut::new(buf)]))
    }

    fn read_vectored(&mut self, bufs: &mut [IoSliceMut<'_>]) -> io::Result<usize> {
        Ok(self.read_segments(bufs))
    }
}

impl Write for MemoryChannel<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_segments(&[IoSlice::new(buf)]))
    }

    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        Ok(self.write_segments(bufs))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::watch::{Prepare, WatchAction, WatchContext, WatchSource};

    #[test]
    fn read_past_capacity_is_short_then_zero() {
        let mut buf = SnapshotBuffer::from_vec((1u8..=8).collect());
        let mut chan = MemoryChannel::new(&mut buf);

        let mut dst = [0u8; 16];
        let n = chan.readv(&mut [IoSliceMut::new(&mut dst)]).unwrap();
        assert_eq!(n, 8);
        assert_eq!(chan.pos(), 8);
        assert_eq!(&dst[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(dst[8..].iter().all(|&b| b == 0));

        let mut more = [0xAAu8; 4];
        assert_eq!(chan.readv(&mut [IoSliceMut::new(&mut more)]).unwrap(), 0);
        assert_eq!(more, [0xAA; 4]);
    }

    #[test]
    fn read_stops_mid_segment_list() {
        let mut buf = SnapshotBuffer::from_vec(vec![9, 8, 7, 6, 5]);
        buf.set_pos(1);
        let mut chan = MemoryChannel::new(&mut buf);

        let mut a = [0u8; 2];
        let mut b = [0u8; 3];
        let mut c = [0xFFu8; 2];
        let n = chan
            .readv(&mut [
                IoSliceMut::new(&mut a),
                IoSliceMut::new(&mut b),
                IoSliceMut::new(&mut c),
            ])
            .unwrap();
        assert_eq!(n, 4);
        assert_eq!(a, [8, 7]);
        assert_eq!(b, [6, 5, 0]);
        assert_eq!(c, [0xFF, 0xFF]);
        assert_eq!(chan.pos(), 5);
    }

    #[test]
    fn read_with_cursor_beyond_capacity_returns_zero() {
        let mut buf = SnapshotBuffer::new(4);
        buf.set_pos(6);
        let mut chan = MemoryChannel::new(&mut buf);
        let mut dst = [0u8; 4];
        assert_eq!(chan.read(&mut dst).unwrap(), 0);
        assert_eq!(chan.pos(), 6);
    }

    #[test]
    fn vectored_write_advances_cursor_per_segment() {
        let mut buf = SnapshotBuffer::new(8);
        {
            let mut chan = MemoryChannel::new(&mut buf);
            let n = chan
                .writev(&[IoSlice::new(&[1, 2, 3]), IoSlice::new(&[]), IoSlice::new(&[4, 5])])
                .unwrap();
            assert_eq!(n, 5);
            assert_eq!(chan.pos(), 5);
        }
        assert_eq!(buf.filled(), &[1, 2, 3, 4, 5]);
        assert_eq!(&buf.as_slice()[5..], &[0, 0, 0]);
    }

    #[test]
    fn write_exactly_to_capacity() {
        let mut buf = SnapshotBuffer::new(4);
        let mut chan = MemoryChannel::new(&mut buf);
        chan.write_all(&[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
        assert_eq!(chan.pos(), 4);
        assert_eq!(chan.write(&[]).unwrap(), 0);
        assert_eq!(buf.as_slice(), &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn empty_write_with_cursor_beyond_capacity_is_a_no_op() {
        let mut buf = SnapshotBuffer::from_vec(vec![1, 2, 3, 4]);
        buf.set_pos(5);
        {
            let mut chan = MemoryChannel::new(&mut buf);
            assert_eq!(chan.write(&[]).unwrap(), 0);
            chan.write_all(&[]).unwrap();
            assert_eq!(chan.pos(), 5);

            chan.buf.set_pos(6);
            let n = chan
                .writev(&[IoSlice::new(&[]), IoSlice::new(&[])])
                .unwrap();
            assert_eq!(n, 0);
            assert_eq!(chan.write_vectored(&[IoSlice::new(&[])]).unwrap(), 0);
            assert_eq!(chan.pos(), 6);
        }
        assert_eq!(buf.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    #[should_panic]
    fn write_overrun_panics_instead_of_corrupting() {
        let mut buf = SnapshotBuffer::new(2);
        let mut chan = MemoryChannel::new(&mut buf);
        let _ = chan.write(&[1, 2, 3]);
    }

    #[test]
    fn close_and_set_blocking_leave_buffer_intact() {
        let mut buf = SnapshotBuffer::from_vec(vec![1, 2, 3]);
        {
            let mut chan = MemoryChannel::new(&mut buf);
            chan.set_blocking(true).unwrap();
            chan.set_blocking(false).unwrap();
            chan.close().unwrap();
            let mut dst = [0u8; 3];
            assert_eq!(chan.read(&mut dst).unwrap(), 3);
            assert_eq!(dst, [1, 2, 3]);
        }
        assert_eq!(buf.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn readable_watch_is_ready_on_first_poll() {
        let mut buf = SnapshotBuffer::new(0);
        let mut chan = MemoryChannel::new(&mut buf);
        assert!(chan.is_ready(IoCondition::IN));
        assert!(chan.is_ready(IoCondition::OUT));
        assert!(!chan.is_ready(IoCondition::HUP));

        let mut seen = Vec::new();
        {
            let mut ctx = WatchContext::new(&mut chan);
            ctx.add_watch(IoCondition::IN, |_, cond| {
                seen.push(cond);
                WatchAction::Remove
            });
            assert_eq!(ctx.iterate(), 1);
            assert!(ctx.is_empty());
        }
        assert_eq!(seen, vec![IoCondition::IN]);
    }

    #[test]
    fn watch_prepare_and_check_never_wait() {
        let masks = [
            IoCondition::IN,
            IoCondition::OUT,
            IoCondition::IN | IoCondition::OUT,
        ];
        for contents in [Vec::new(), vec![1, 2, 3]] {
            let mut buf = SnapshotBuffer::from_vec(contents);
            let chan = MemoryChannel::new(&mut buf);
            for mask in masks {
                let mut watch = chan.create_watch(mask);
                assert_eq!(
                    <ReadinessWatch as WatchSource<MemoryChannel<'_>>>::condition(&watch),
                    mask
                );
                assert_eq!(
                    watch.prepare(&chan),
                    Prepare {
                        ready: true,
                        timeout: Some(Duration::ZERO),
                    }
                );
                assert!(watch.check(&chan));
            }
        }
    }

    #[test]
    fn watch_dispatch_masks_out_conditions_never_raised() {
        let mut buf = SnapshotBuffer::new(4);
        let mut chan = MemoryChannel::new(&mut buf);
        let mut watch = chan.create_watch(IoCondition::IN | IoCondition::HUP);

        let mut seen = None;
        let action = <ReadinessWatch as WatchSource<MemoryChannel<'_>>>::dispatch(
            &mut watch,
            &mut chan,
            &mut |_, cond| {
                seen = Some(cond);
                WatchAction::Remove
            },
        );
        assert_eq!(action, WatchAction::Remove);
        assert_eq!(seen, Some(IoCondition::IN));
    }

    #[test]
    fn watch_dispatch_reports_requested_condition_only() {
        let mut buf = SnapshotBuffer::new(4);
        let mut chan = MemoryChannel::new(&mut buf);
        let mut seen = Vec::new();
        {
            let mut ctx = WatchContext::new(&mut chan);
            ctx.add_watch(IoCondition::OUT | IoCondition::ERR, |chan, cond| {
                seen.push(cond);
                chan.write_all(&[0x55]).unwrap();
                WatchAction::Continue
            });
            assert_eq!(ctx.run(3), 3);
        }
        assert_eq!(seen, vec![IoCondition::OUT; 3]);
        assert_eq!(chan.pos(), 3);
    }
}
