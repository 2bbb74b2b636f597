use bytes::{BufMut, Bytes, BytesMut};

/// Builds nested ISO-BMFF boxes into one buffer.
///
/// `begin` reserves the 32-bit size, `end` patches it once the box body is
/// written, so boxes can be nested without knowing their sizes up front.
#[derive(Debug, Default)]
pub struct BoxWriter {
    buf: BytesMut,
    open: Vec<usize>,
}

impl BoxWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a plain box.
    pub fn begin(&mut self, kind: &[u8; 4]) -> &mut Self {
        self.open.push(self.buf.len());
        self.buf.put_u32(0);
        self.buf.put_slice(kind);
        self
    }

    /// Opens a full box: version byte plus 24 bits of flags.
    pub fn begin_full(&mut self, kind: &[u8; 4], version: u8, flags: u32) -> &mut Self {
        self.begin(kind);
        self.buf.put_u32(((version as u32) << 24) | (flags & 0x00FF_FFFF));
        self
    }

    /// Closes the innermost open box.
    pub fn end(&mut self) -> &mut Self {
        if let Some(start) = self.open.pop() {
            let size = (self.buf.len() - start) as u32;
            self.buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
        }
        self
    }

    /// Writes one byte.
    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.put_u8(v);
        self
    }

    /// Writes a big-endian `u16`.
    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.put_u16(v);
        self
    }

    /// Writes a big-endian `u32`.
    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.put_u32(v);
        self
    }

    /// Writes a big-endian `u64`.
    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.put_u64(v);
        self
    }

    /// Writes raw bytes.
    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.put_slice(data);
        self
    }

    /// Writes `count` zero bytes.
    pub fn zeros(&mut self, count: usize) -> &mut Self {
        self.buf.put_bytes(0, count);
        self
    }

    /// Bytes written so far, open boxes included.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Overwrites a big-endian u32 written earlier.
    pub fn patch_u32(&mut self, offset: usize, v: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&v.to_be_bytes());
    }

    /// Closes any boxes left open and returns the buffer.
    pub fn finish(mut self) -> Bytes {
        while !self.open.is_empty() {
            self.end();
        }
        self.buf.freeze()
    }
}

/// Identity transformation matrix shared by `mvhd` and `tkhd`.
pub const UNITY_MATRIX: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

/// Writes an MPEG-4 descriptor (`esds` contents): tag, expandable size, body.
pub fn write_descriptor(w: &mut BoxWriter, tag: u8, body: &[u8]) {
    w.u8(tag);
    let len = body.len() as u32;
    if len < 0x80 {
        w.u8(len as u8);
    } else {
        // Four-byte expandable form.
        w.u8(0x80 | ((len >> 21) & 0x7F) as u8)
            .u8(0x80 | ((len >> 14) & 0x7F) as u8)
            .u8(0x80 | ((len >> 7) & 0x7F) as u8)
            .u8((len & 0x7F) as u8);
    }
    w.bytes(body);
}

/// Walks the top-level boxes of `data`, yielding (type, whole box).
pub fn iter_boxes(data: &[u8]) -> impl Iterator<Item = ([u8; 4], &[u8])> {
    let mut offset = 0usize;
    std::iter::from_fn(move || {
        let header = data.get(offset..offset + 8)?;
        let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if size < 8 || offset + size > data.len() {
            return None;
        }
        let kind = [header[4], header[5], header[6], header[7]];
        let whole = &data[offset..offset + size];
        offset += size;
        Some((kind, whole))
    })
}

/// Finds the first box of `kind` along a path of nested box types.
pub fn find_box<'a>(data: &'a [u8], path: &[&[u8; 4]]) -> Option<&'a [u8]> {
    let (first, rest) = path.split_first()?;
    let (_, found) = iter_boxes(data).find(|(kind, _)| kind == *first)?;
    if rest.is_empty() {
        Some(found)
    } else {
        find_box(&found[8..], rest)
    }
}
