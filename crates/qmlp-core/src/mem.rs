//! `$readmemh` 形式のテーブルファイル I/O（gzip 対応）
//!
//! - 空白区切りの 16 進トークン。1 行に複数トークンを置いてよい
//! - `//` 以降は行末までコメント
//! - `@addr` でロード先アドレスを移動（16 進）。テーブル長以上のアドレスはエラー
//! - i8 テーブルは 2 桁、i32 テーブルは 8 桁まで。値は 2 の補数として解釈する
//!
//! 書き出しはエクスポータと同じレイアウト:
//! i8 行列は 1 行 = 1 出力ニューロン（`{:02x}` を空白区切り）、
//! i32 ベクトルと入力サンプルは 1 行 1 値。

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{QmlpError, QmlpResult};

const READER_BUF_CAP: usize = 128 * 1024; // 128 KiB

/// テーブルの要素型
pub trait MemWord: Copy + Default {
    /// 1 トークンの最大桁数
    const HEX_DIGITS: usize;

    fn from_bits(bits: u32) -> Self;

    fn to_bits(self) -> u32;
}

impl MemWord for i8 {
    const HEX_DIGITS: usize = 2;

    #[inline]
    fn from_bits(bits: u32) -> Self {
        bits as u8 as i8
    }

    #[inline]
    fn to_bits(self) -> u32 {
        self as u8 as u32
    }
}

impl MemWord for i32 {
    const HEX_DIGITS: usize = 8;

    #[inline]
    fn from_bits(bits: u32) -> Self {
        bits as i32
    }

    #[inline]
    fn to_bits(self) -> u32 {
        self as u32
    }
}

fn parse_hex(token: &str, max_digits: usize, line: usize) -> QmlpResult<u32> {
    let digits: String = token.chars().filter(|&c| c != '_').collect();
    let invalid = |reason| QmlpError::MemParse {
        line,
        token: token.to_string(),
        reason,
    };
    if digits.is_empty() {
        return Err(invalid("empty value"));
    }
    // from_str_radix は先頭の `+` を受け付けてしまう
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("not a hex number"));
    }
    if digits.len() > max_digits {
        return Err(invalid("too many hex digits for the table width"));
    }
    u32::from_str_radix(&digits, 16).map_err(|_| invalid("not a hex number"))
}

/// テキストをパース
pub fn parse_mem<T: MemWord>(text: &str, capacity: usize) -> QmlpResult<Vec<T>> {
    read_mem(text.as_bytes(), capacity)
}

/// リーダからパース
///
/// `capacity` はテーブルの想定長。`@addr` で `capacity` 以上に飛ぶと `MemParse`。
/// 連続したトークンは想定長を超えても読み、長さの検証は呼び出し側に任せる。
pub fn read_mem<T: MemWord, R: BufRead>(reader: R, capacity: usize) -> QmlpResult<Vec<T>> {
    let mut values: Vec<T> = Vec::new();
    let mut cursor = 0usize;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        let content = match line.find("//") {
            Some(pos) => &line[..pos],
            None => &line,
        };

        for token in content.split_whitespace() {
            if let Some(addr) = token.strip_prefix('@') {
                let target = parse_hex(addr, 8, line_no)? as usize;
                if target >= capacity {
                    return Err(QmlpError::MemParse {
                        line: line_no,
                        token: token.to_string(),
                        reason: "address out of range",
                    });
                }
                cursor = target;
                continue;
            }
            let value = T::from_bits(parse_hex(token, T::HEX_DIGITS, line_no)?);
            if cursor >= values.len() {
                values.resize(cursor + 1, T::default());
            }
            values[cursor] = value;
            cursor += 1;
        }
    }

    Ok(values)
}

/// ファイルから読み込む（`.gz` は透過的に展開）
pub fn load_mem<T: MemWord, P: AsRef<Path>>(path: P, capacity: usize) -> QmlpResult<Vec<T>> {
    read_mem(open_reader(path)?, capacity)
}

/// 1 行に `row_len` 個ずつ書く（i8 行列用）
pub fn write_mem_rows<T: MemWord, W: Write>(
    writer: &mut W,
    values: &[T],
    row_len: usize,
) -> io::Result<()> {
    for row in values.chunks(row_len.max(1)) {
        let tokens: Vec<String> = row.iter().map(|&v| format_word(v)).collect();
        writeln!(writer, "{}", tokens.join(" "))?;
    }
    Ok(())
}

/// 1 行 1 値で書く
pub fn write_mem_words<T: MemWord, W: Write>(writer: &mut W, values: &[T]) -> io::Result<()> {
    write_mem_rows(writer, values, 1)
}

#[inline]
fn format_word<T: MemWord>(value: T) -> String {
    format!("{:0width$x}", value.to_bits(), width = T::HEX_DIGITS)
}

pub fn open_reader<P: AsRef<Path>>(path: P) -> QmlpResult<Box<dyn BufRead>> {
    let p = path.as_ref();
    let f = File::open(p)?;
    let ext = p.extension().and_then(|e| e.to_str()).unwrap_or_default().to_ascii_lowercase();

    if ext == "gz" {
        let dec = flate2::read::GzDecoder::new(f);
        return Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, dec)));
    }
    Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, f)))
}

/// Writer wrapper to propagate finish/close errors for compressed outputs.
#[must_use = "call .close() to propagate compression/IO errors"]
pub enum Writer {
    Plain(BufWriter<File>),
    Gz(flate2::write::GzEncoder<File>),
}

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Writer::Plain(f) => f.write(buf),
            Writer::Gz(e) => e.write(buf),
        }
    }
    fn flush(&mut self) -> io::Result<()> {
        match self {
            Writer::Plain(f) => f.flush(),
            Writer::Gz(e) => e.flush(),
        }
    }
}

impl Writer {
    /// Finalize the stream and flush the underlying file.
    pub fn close(self) -> io::Result<()> {
        match self {
            Writer::Plain(f) => {
                let mut file = f.into_inner().map_err(|e| e.into_error())?;
                file.flush()
            }
            Writer::Gz(e) => {
                let mut f = e.finish()?;
                f.flush()
            }
        }
    }
}

pub fn open_writer<P: AsRef<Path>>(path: P) -> io::Result<Writer> {
    let p = path.as_ref();
    let ext = p.extension().and_then(|e| e.to_str()).unwrap_or_default().to_ascii_lowercase();
    let f = File::create(p)?;
    if ext == "gz" {
        let enc = flate2::write::GzEncoder::new(f, flate2::Compression::default());
        return Ok(Writer::Gz(enc));
    }
    Ok(Writer::Plain(BufWriter::new(f)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_i8_rows_and_comments() {
        let text = "// W1 row 0\n7f 80 ff 00\n01 fe // row 1 (partial)\n\n";
        let values: Vec<i8> = parse_mem(text, 6).unwrap();
        assert_eq!(values, vec![127, -128, -1, 0, 1, -2]);
    }

    #[test]
    fn test_parse_i32_twos_complement() {
        let text = "00000005\nfffffffd\n7fffffff\n80000000\n0bebc200\n";
        let values: Vec<i32> = parse_mem(text, 5).unwrap();
        assert_eq!(values, vec![5, -3, i32::MAX, i32::MIN, 200_000_000]);
    }

    #[test]
    fn test_parse_address_directive() {
        let values: Vec<i8> = parse_mem("@2 0a 0b\n@0 01", 4).unwrap();
        assert_eq!(values, vec![1, 0, 10, 11]);
    }

    #[test]
    fn test_parse_errors_carry_line() {
        let err = parse_mem::<i8>("00\n100\n", 2).unwrap_err();
        match err {
            QmlpError::MemParse { line, token, .. } => {
                assert_eq!(line, 2);
                assert_eq!(token, "100");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(parse_mem::<i32>("0000zz00", 1).is_err());
    }

    #[test]
    fn test_address_beyond_table_rejected() {
        let err = parse_mem::<i32>("@00ffffff 01\n", 16).unwrap_err();
        match err {
            QmlpError::MemParse { line, token, reason } => {
                assert_eq!(line, 1);
                assert_eq!(token, "@00ffffff");
                assert_eq!(reason, "address out of range");
            }
            other => panic!("unexpected: {other:?}"),
        }
        // 末尾ちょうどは範囲外、その手前は可
        assert!(parse_mem::<i8>("@4 01", 4).is_err());
        assert_eq!(parse_mem::<i8>("@3 01", 4).unwrap(), vec![0, 0, 0, 1]);
    }

    #[test]
    fn test_sign_prefix_rejected() {
        for token in ["+7f", "-1", "+1"] {
            let err = parse_mem::<i8>(token, 1).unwrap_err();
            assert!(
                matches!(err, QmlpError::MemParse { reason: "not a hex number", .. }),
                "{token}"
            );
        }
        assert!(parse_mem::<i32>("@+1 00", 4).is_err());
        assert_eq!(parse_mem::<i8>("7_f", 1).unwrap(), vec![127]);
    }

    #[test]
    fn test_gz_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.mem.gz");
        let mut w = open_writer(&path).unwrap();
        assert!(matches!(w, Writer::Gz(_)));
        write_mem_words(&mut w, &[-3i32, 5, i32::MIN]).unwrap();
        w.close().unwrap();

        // gzip のマジックで始まる
        let raw = std::fs::read(&path).unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);
        assert_eq!(load_mem::<i32, _>(&path, 3).unwrap(), vec![-3, 5, i32::MIN]);
    }

    #[test]
    fn test_write_layout() {
        let mut buf = Vec::new();
        write_mem_rows(&mut buf, &[1i8, -1, 16, -128], 2).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "01 ff\n10 80\n");

        let mut buf = Vec::new();
        write_mem_words(&mut buf, &[-3i32, 5]).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "fffffffd\n00000005\n");
    }
}
