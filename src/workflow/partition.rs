//! 车型分批

use crate::models::{Batch, WorkItem};

/// 按顺序把车型切成每批不超过 `batch_size` 个
///
/// 每个车型恰好出现一次，顺序不变；空输入得到空结果。
/// `batch_size` 为 0 时按 1 处理。
pub fn partition(items: &[WorkItem], batch_size: usize) -> Vec<Batch> {
    items
        .chunks(batch_size.max(1))
        .map(<[WorkItem]>::to_vec)
        .collect()
}
