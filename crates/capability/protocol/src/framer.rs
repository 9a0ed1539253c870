//! 字节流 → 文本帧
//!
//! 以一个或多个 CR/LF 作为行边界。跨读取边界的半行保存在 `partial` 中；
//! UTF-8 下被读取边界截断的多字节字符保存在 `pending` 中，
//! 因此组帧结果与字节如何分块到达无关。

use crate::types::TextEncoding;

/// 一次解码的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    /// 是否使用了 Latin-1 回退
    pub fallback: bool,
}

/// 按配置编码解码一段字节，失败时回退为 Latin-1
pub fn decode(bytes: &[u8], encoding: TextEncoding) -> Decoded {
    match encoding {
        TextEncoding::Ascii if bytes.is_ascii() => Decoded {
            text: bytes.iter().map(|&b| b as char).collect(),
            fallback: false,
        },
        TextEncoding::Utf8 => match std::str::from_utf8(bytes) {
            Ok(text) => Decoded {
                text: text.to_string(),
                fallback: false,
            },
            Err(_) => Decoded {
                text: latin1(bytes),
                fallback: true,
            },
        },
        TextEncoding::Latin1 => Decoded {
            text: latin1(bytes),
            fallback: false,
        },
        TextEncoding::Ascii => Decoded {
            text: latin1(bytes),
            fallback: true,
        },
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn is_line_break(c: char) -> bool {
    c == '\r' || c == '\n'
}

/// 行组帧器
#[derive(Debug, Default)]
pub struct LineFramer {
    encoding: TextEncoding,
    partial: String,
    /// 尚未凑齐的 UTF-8 多字节序列（最多 3 字节）
    pending: Vec<u8>,
}

impl LineFramer {
    pub fn new(encoding: TextEncoding) -> Self {
        Self {
            encoding,
            partial: String::new(),
            pending: Vec::new(),
        }
    }

    /// 追加一段原始字节，返回其中完成的帧（已去首尾空白、非空）
    pub fn push(&mut self, bytes: &[u8]) -> FramerOutput {
        let decoded = match self.encoding {
            TextEncoding::Utf8 => self.decode_utf8(bytes),
            encoding => decode(bytes, encoding),
        };
        let frames = self.push_text(&decoded.text);
        FramerOutput {
            frames,
            decode_fallback: decoded.fallback,
        }
    }

    /// UTF-8 流式解码：末尾不完整的序列留到下一块，真正非法的字节才回退 Latin-1
    fn decode_utf8(&mut self, bytes: &[u8]) -> Decoded {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(bytes);
        let err = match String::from_utf8(input) {
            Ok(text) => {
                return Decoded {
                    text,
                    fallback: false,
                };
            }
            Err(err) => err,
        };

        let utf8 = err.utf8_error();
        let mut input = err.into_bytes();
        if utf8.error_len().is_some() {
            return Decoded {
                text: latin1(&input),
                fallback: true,
            };
        }
        self.pending = input.split_off(utf8.valid_up_to());
        match String::from_utf8(input) {
            Ok(text) => Decoded {
                text,
                fallback: false,
            },
            Err(err) => Decoded {
                text: latin1(err.as_bytes()),
                fallback: true,
            },
        }
    }

    /// 追加已解码文本
    pub fn push_text(&mut self, text: &str) -> Vec<String> {
        self.partial.push_str(text);
        let ends_on_boundary = self.partial.ends_with(is_line_break);

        let mut segments: Vec<&str> = self.partial.split(is_line_break).collect();
        let last = segments.pop().unwrap_or_default();
        let frames: Vec<String> = segments
            .into_iter()
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();

        let carry = if ends_on_boundary {
            String::new()
        } else {
            last.to_string()
        };
        self.partial = carry;
        frames
    }

    /// 当前未完成的半行
    pub fn partial(&self) -> &str {
        &self.partial
    }

    /// 丢弃半行与未凑齐的字节（重连后调用）
    pub fn reset(&mut self) {
        self.partial.clear();
        self.pending.clear();
    }
}

/// `LineFramer::push` 的输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramerOutput {
    pub frames: Vec<String>,
    pub decode_fallback: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_all(chunks: &[&[u8]]) -> Vec<String> {
        frame_all_as(TextEncoding::Ascii, chunks)
    }

    fn frame_all_as(encoding: TextEncoding, chunks: &[&[u8]]) -> Vec<String> {
        let mut framer = LineFramer::new(encoding);
        chunks
            .iter()
            .flat_map(|chunk| framer.push(chunk).frames)
            .collect()
    }

    #[test]
    fn test_split_on_crlf_runs() {
        let frames = frame_all(&[b"ST,GS,+0001.25kg\r\n\r\nST,GS,+0001.30kg\n".as_slice()]);
        assert_eq!(frames, vec!["ST,GS,+0001.25kg", "ST,GS,+0001.30kg"]);
    }

    #[test]
    fn test_partial_line_is_carried() {
        let mut framer = LineFramer::new(TextEncoding::Ascii);
        assert!(framer.push(b"  12.3").frames.is_empty());
        assert_eq!(framer.partial(), "  12.3");
        assert_eq!(framer.push(b"45\r\n").frames, vec!["12.345"]);
        assert_eq!(framer.partial(), "");
    }

    #[test]
    fn test_chunk_boundary_independence() {
        let stream: &[u8] = b"\r\nA 1.0\r\nB 2.0\n\rC 3.0\r\r\nD";
        let whole = frame_all(&[stream]);
        for split in 0..=stream.len() {
            let (head, tail) = stream.split_at(split);
            assert_eq!(frame_all(&[head, tail]), whole, "split at {split}");
        }
        let bytewise: Vec<&[u8]> = stream.chunks(1).collect();
        assert_eq!(frame_all(&bytewise), whole);
        assert_eq!(whole, vec!["A 1.0", "B 2.0", "C 3.0"]);
    }

    #[test]
    fn test_blank_lines_are_dropped() {
        assert!(frame_all(&[b"   \r\n\t\n".as_slice()]).is_empty());
    }

    #[test]
    fn test_non_ascii_falls_back_to_latin1() {
        let decoded = decode(&[b'2', b'5', 0xB0, b'C'], TextEncoding::Ascii);
        assert!(decoded.fallback);
        assert_eq!(decoded.text, "25\u{00b0}C");

        let decoded = decode(b"12.5", TextEncoding::Ascii);
        assert!(!decoded.fallback);
        assert_eq!(decoded.text, "12.5");
    }

    #[test]
    fn test_invalid_utf8_falls_back() {
        let decoded = decode(&[0xff, b'1'], TextEncoding::Utf8);
        assert!(decoded.fallback);
        assert_eq!(decoded.text.chars().count(), 2);
        assert!(!decode("é".as_bytes(), TextEncoding::Utf8).fallback);
    }

    #[test]
    fn test_utf8_chunk_boundary_independence() {
        let text = "W 1.5 kg\u{e9}\r\nT 25\u{b0}C\n\u{20ac} 3.0\r\n\u{1f4e6} 4\r\n";
        let stream = text.as_bytes();
        let whole = frame_all_as(TextEncoding::Utf8, &[stream]);
        assert_eq!(
            whole,
            vec!["W 1.5 kg\u{e9}", "T 25\u{b0}C", "\u{20ac} 3.0", "\u{1f4e6} 4"]
        );
        for split in 0..=stream.len() {
            let (head, tail) = stream.split_at(split);
            assert_eq!(
                frame_all_as(TextEncoding::Utf8, &[head, tail]),
                whole,
                "split at {split}"
            );
        }
        let bytewise: Vec<&[u8]> = stream.chunks(1).collect();
        assert_eq!(frame_all_as(TextEncoding::Utf8, &bytewise), whole);
    }

    #[test]
    fn test_split_multibyte_char_is_not_a_fallback() {
        let bytes = "kg\u{e9}\r\n".as_bytes();
        let mut framer = LineFramer::new(TextEncoding::Utf8);
        let first = framer.push(&bytes[..3]);
        assert!(first.frames.is_empty());
        assert!(!first.decode_fallback);
        assert_eq!(framer.partial(), "kg");
        let second = framer.push(&bytes[3..]);
        assert!(!second.decode_fallback);
        assert_eq!(second.frames, vec!["kg\u{e9}"]);

        let invalid = framer.push(&[0xff, b'1', b'\n']);
        assert!(invalid.decode_fallback);
        assert_eq!(invalid.frames, vec!["\u{ff}1"]);
    }
}
