use bytes::Bytes;

/// 出站数据单元。
///
/// # 教案式说明
/// - **意图 (Why)**：一次 `send_data` 对应一个 `Packet`，在多次部分写之间保持原始负载与已发送游标，
///   保证冲刷时既能按需切片，又能在 `data_sent`/`data_not_sent` 中交回完整负载；
/// - **契约 (What)**：`data` 不可变；`cursor` 单调前进且不超过负载长度；空负载在创建时即视为已排空。
#[derive(Clone, Debug)]
pub struct Packet {
    data: Bytes,
    cursor: usize,
}

impl Packet {
    pub fn new(data: Bytes) -> Self {
        Self { data, cursor: 0 }
    }

    /// 原始负载。
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// 尚未写出的部分。
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.cursor..]
    }

    /// 按实际写出字节前移游标，超出部分被截断到负载末尾。
    pub fn advance(&mut self, written: usize) {
        self.cursor = (self.cursor + written).min(self.data.len());
    }

    pub fn is_drained(&self) -> bool {
        self.cursor >= self.data.len()
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }
}
