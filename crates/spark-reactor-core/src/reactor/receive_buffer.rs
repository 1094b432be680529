use std::io;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::{config::validate_buffer_size, error::TransportError};

/// reactor 级共享接收缓冲。
///
/// # 教案式说明
/// - **意图 (Why)**：同一 reactor 上的读取串行发生，复用一块固定容量缓冲即可避免每次读取分配；
/// - **契约 (What)**：缓冲只在锁内可见，读取到的字节在临界区内复制为新的 `Bytes` 后才交给过滤器链；
/// - **风险 (Trade-offs)**：复制一次换取缓冲不外泄，负载越大复制成本越高。
#[derive(Debug)]
pub struct ReceiveBuffer {
    buf: Mutex<Vec<u8>>,
}

impl ReceiveBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Mutex::new(vec![0; capacity]),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.lock().len()
    }

    /// 重新分配缓冲，容量为 0 时返回 `InvalidArgument`。
    pub fn resize(&self, capacity: usize) -> Result<(), TransportError> {
        validate_buffer_size("receive_buffer_size", capacity)?;
        *self.buf.lock() = vec![0; capacity];
        Ok(())
    }

    /// 在锁内执行一次读取，并把读到的前 `n` 字节复制为独立负载。
    ///
    /// `read` 返回 `(n, extra)`，`extra` 用于携带数据报的来源地址等附加信息。
    pub fn read_with<T, F>(&self, read: F) -> io::Result<(Bytes, T)>
    where
        F: FnOnce(&mut [u8]) -> io::Result<(usize, T)>,
    {
        let mut buf = self.buf.lock();
        let (len, extra) = read(buf.as_mut_slice())?;
        let len = len.min(buf.len());
        Ok((Bytes::copy_from_slice(&buf[..len]), extra))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_out_only_the_bytes_read() {
        let buffer = ReceiveBuffer::new(8);
        let (data, tag) = buffer
            .read_with(|buf| {
                buf[..3].copy_from_slice(b"abc");
                Ok((3, "peer"))
            })
            .expect("读取成功");
        assert_eq!(data.as_ref(), b"abc");
        assert_eq!(tag, "peer");
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let buffer = ReceiveBuffer::new(4);
        assert!(buffer.resize(0).is_err());
        assert_eq!(buffer.capacity(), 4);
    }
}
