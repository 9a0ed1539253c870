//! 最近帧的滑动窗口
//!
//! 采集任务写入、验证器与发现流程读取，所有访问都在同一把锁内完成；
//! 读取方只拿到副本。

use chrono::{DateTime, TimeDelta, Utc};
use domain::Frame;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// 默认硬上限
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;
/// 超限后保留的尾部长度
pub const DEFAULT_BUFFER_RETAIN: usize = 500;

/// 有界帧缓冲
#[derive(Debug)]
pub struct FrameBuffer {
    frames: Mutex<VecDeque<Frame>>,
    capacity: usize,
    retain: usize,
}

impl FrameBuffer {
    /// `retain` 会被限制在 `capacity` 以内
    pub fn new(capacity: usize, retain: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: Mutex::new(VecDeque::new()),
            capacity,
            retain: retain.min(capacity),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Frame>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 追加帧；超过硬上限时只保留最近 `retain` 条。返回本次截断的次数。
    pub fn extend<I>(&self, frames: I) -> usize
    where
        I: IntoIterator<Item = Frame>,
    {
        let mut buffer = self.lock();
        let mut truncations = 0;
        for frame in frames {
            buffer.push_back(frame);
            if buffer.len() > self.capacity {
                let excess = buffer.len() - self.retain;
                buffer.drain(..excess);
                truncations += 1;
            }
        }
        truncations
    }

    pub fn push(&self, frame: Frame) -> bool {
        self.extend(std::iter::once(frame)) > 0
    }

    /// 返回捕获时间晚于 `now - max_age` 的帧副本，保持到达顺序
    pub fn recent(&self, max_age: Duration) -> Vec<Frame> {
        self.recent_at(Utc::now(), max_age)
    }

    pub fn recent_at(&self, now: DateTime<Utc>, max_age: Duration) -> Vec<Frame> {
        let cutoff = TimeDelta::from_std(max_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age));
        let buffer = self.lock();
        match cutoff {
            Some(cutoff) => buffer
                .iter()
                .filter(|frame| frame.captured_at > cutoff)
                .cloned()
                .collect(),
            None => buffer.iter().cloned().collect(),
        }
    }

    /// 捕获时间晚于 `after` 的帧副本；`None` 返回全部
    pub fn frames_since(&self, after: Option<DateTime<Utc>>) -> Vec<Frame> {
        let buffer = self.lock();
        match after {
            Some(after) => buffer
                .iter()
                .filter(|frame| frame.captured_at > after)
                .cloned()
                .collect(),
            None => buffer.iter().cloned().collect(),
        }
    }

    /// 全量副本
    pub fn snapshot(&self) -> Vec<Frame> {
        self.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY, DEFAULT_BUFFER_RETAIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_truncates_to_retained_tail() {
        let buffer = FrameBuffer::new(10, 4);
        let truncations = buffer.extend((0..11).map(|i| Frame::at(i.to_string(), ts(i))));
        assert_eq!(truncations, 1);
        let texts: Vec<String> = buffer.snapshot().into_iter().map(|f| f.text).collect();
        assert_eq!(texts, vec!["7", "8", "9", "10"]);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let buffer = FrameBuffer::new(1000, 500);
        for i in 0..5000 {
            buffer.push(Frame::at(format!("{i}"), ts(i)));
            assert!(buffer.len() <= 1000);
        }
        let last = buffer.snapshot().pop().unwrap();
        assert_eq!(last.text, "4999");
    }

    #[test]
    fn test_recent_filters_by_age_and_keeps_order() {
        let buffer = FrameBuffer::default();
        buffer.extend(vec![
            Frame::at("old", ts(0)),
            Frame::at("edge", ts(5)),
            Frame::at("a", ts(7)),
            Frame::at("b", ts(9)),
        ]);
        let recent = buffer.recent_at(ts(10), Duration::from_secs(5));
        let texts: Vec<&str> = recent.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b"]);
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn test_huge_max_age_returns_everything() {
        let buffer = FrameBuffer::default();
        buffer.push(Frame::at("x", ts(0)));
        assert_eq!(buffer.recent_at(ts(1), Duration::MAX).len(), 1);
    }

    #[test]
    fn test_frames_since_excludes_cursor() {
        let buffer = FrameBuffer::default();
        buffer.extend(vec![
            Frame::at("a", ts(1)),
            Frame::at("b", ts(2)),
            Frame::at("c", ts(2)),
            Frame::at("d", ts(3)),
        ]);
        let texts = |frames: Vec<Frame>| frames.into_iter().map(|f| f.text).collect::<Vec<_>>();
        assert_eq!(texts(buffer.frames_since(None)), vec!["a", "b", "c", "d"]);
        assert_eq!(texts(buffer.frames_since(Some(ts(1)))), vec!["b", "c", "d"]);
        assert_eq!(texts(buffer.frames_since(Some(ts(2)))), vec!["d"]);
        assert!(buffer.frames_since(Some(ts(3))).is_empty());
    }

    #[test]
    fn test_clear() {
        let buffer = FrameBuffer::default();
        buffer.push(Frame::new("x"));
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
