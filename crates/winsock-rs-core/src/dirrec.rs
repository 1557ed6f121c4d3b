//! Directory-record marshalling.
//!
//! Host, protocol, and service lookup results are handed to applications as
//! a single contiguous buffer: a fixed header followed by the name, the
//! NUL-terminated alias strings behind their pointer array, and (for host
//! records) the fixed-length addresses behind theirs. Applications built for
//! different eras address the buffer differently, so every internal pointer
//! field is written through one of three encodings:
//!
//! - `Linear { base }`: absolute values against the address the caller will
//!   place the buffer at,
//! - `Offset`: plain offsets from the buffer start, resolved by the caller,
//! - `Segmented { base }`: offsets rebased against a caller-supplied
//!   segment base; selects the narrow (1-byte-packed) header layout.
//!
//! One serializer handles all three; the encoding only decides how a
//! buffer-relative offset becomes a pointer value.

// ---------------------------------------------------------------------------
// Pointer encodings and header layouts
// ---------------------------------------------------------------------------

/// Pointer width inside serialized records. All supported caller ABIs use
/// 4-byte pointers regardless of the host's own width.
pub const PTR_SIZE: usize = 4;

/// How internal pointer fields are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtrEncoding {
    /// Absolute pointers against the buffer's placement address.
    Linear { base: u32 },
    /// Offsets from the buffer start.
    Offset,
    /// Offsets rebased against a caller-space segment base.
    Segmented { base: u32 },
}

/// Fixed-header flavor: 1-byte-packed (legacy narrow callers) or
/// 4-byte-aligned (current wide callers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLayout {
    Narrow,
    Wide,
}

impl PtrEncoding {
    /// Turns a buffer-relative offset into a pointer value.
    #[must_use]
    pub const fn encode(self, offset: u32) -> u32 {
        match self {
            PtrEncoding::Offset => offset,
            PtrEncoding::Linear { base } | PtrEncoding::Segmented { base } => {
                base.wrapping_add(offset)
            }
        }
    }

    /// Segmented callers are the narrow-layout ones.
    #[must_use]
    pub const fn layout(self) -> RecordLayout {
        match self {
            PtrEncoding::Segmented { .. } => RecordLayout::Narrow,
            _ => RecordLayout::Wide,
        }
    }
}

/// Host record header: name ptr, alias-list ptr, addrtype, addrlen,
/// addr-list ptr. Packed and aligned layouts coincide at 16 bytes.
pub const HOSTENT_HEADER: usize = 16;
/// Protocol record header: name ptr, alias-list ptr, proto number.
pub const PROTOENT_HEADER_NARROW: usize = 10;
pub const PROTOENT_HEADER_WIDE: usize = 12;
/// Service record header: name ptr, alias-list ptr, port, proto ptr.
pub const SERVENT_HEADER_NARROW: usize = 14;
pub const SERVENT_HEADER_WIDE: usize = 16;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A host lookup result before marshalling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRecord {
    pub name: Vec<u8>,
    pub aliases: Vec<Vec<u8>>,
    /// Address family of the entries in `addrs`.
    pub addrtype: i16,
    /// Fixed length of each address entry.
    pub addr_len: usize,
    pub addrs: Vec<Vec<u8>>,
}

/// A protocol lookup result before marshalling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoRecord {
    pub name: Vec<u8>,
    pub aliases: Vec<Vec<u8>>,
    pub proto: i16,
}

/// A service lookup result before marshalling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServRecord {
    pub name: Vec<u8>,
    pub aliases: Vec<Vec<u8>>,
    /// Port in network byte order, as applications expect it.
    pub port: u16,
    pub proto: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Scratch buffer
// ---------------------------------------------------------------------------

/// Marshalling staging area: grows on demand, never shrinks below a
/// previously requested size. Owned by whoever performs lookups, so no
/// cross-thread serialization is needed.
#[derive(Debug, Default)]
pub struct Scratch {
    buf: Vec<u8>,
}

impl Scratch {
    #[must_use]
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Hands out a zeroed region of exactly `size` bytes, growing the
    /// backing storage if needed. Returns `None` when the allocator refuses.
    pub fn request(&mut self, size: usize) -> Option<&mut [u8]> {
        if self.buf.len() < size {
            let additional = size - self.buf.len();
            if self.buf.try_reserve(additional).is_err() {
                return None;
            }
            self.buf.resize(size, 0);
        }
        let region = &mut self.buf[..size];
        region.fill(0);
        Some(region)
    }

    /// Current backing size (high-water mark of all requests).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }
}

// ---------------------------------------------------------------------------
// Little-endian field access
// ---------------------------------------------------------------------------

pub fn put_u16(buf: &mut [u8], at: usize, v: u16) {
    buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

pub fn put_i16(buf: &mut [u8], at: usize, v: i16) {
    put_u16(buf, at, v as u16);
}

pub fn put_u32(buf: &mut [u8], at: usize, v: u32) {
    buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

#[must_use]
pub fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

#[must_use]
pub fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

// ---------------------------------------------------------------------------
// List marshalling
// ---------------------------------------------------------------------------

/// Bytes needed for a pointer array plus its payload entries.
///
/// `item_size == 0` means variable-length NUL-terminated entries; otherwise
/// every entry occupies exactly `item_size` bytes. The array always carries
/// a terminating NUL pointer, even when empty.
#[must_use]
pub fn list_size(items: &[Vec<u8>], item_size: usize) -> usize {
    let payload: usize = items
        .iter()
        .map(|i| if item_size != 0 { item_size } else { i.len() + 1 })
        .sum();
    payload + (items.len() + 1) * PTR_SIZE
}

/// Writes the pointer array at `at`, then the payload entries immediately
/// behind it. Pointer values are encoded with `enc`; the terminator entry is
/// always a literal zero. Returns the bytes written.
fn write_list(
    buf: &mut [u8],
    at: usize,
    items: &[Vec<u8>],
    item_size: usize,
    enc: PtrEncoding,
) -> usize {
    let mut payload = at + (items.len() + 1) * PTR_SIZE;
    for (i, item) in items.iter().enumerate() {
        put_u32(buf, at + i * PTR_SIZE, enc.encode(payload as u32));
        let entry = if item_size != 0 { item_size } else { item.len() + 1 };
        let n = item.len().min(entry);
        buf[payload..payload + n].copy_from_slice(&item[..n]);
        // variable entries get their NUL from the zeroed scratch
        payload += entry;
    }
    put_u32(buf, at + items.len() * PTR_SIZE, 0);
    payload - at
}

// ---------------------------------------------------------------------------
// Record serialization
// ---------------------------------------------------------------------------

/// Total marshalled size of a host record.
#[must_use]
pub fn host_record_size(rec: &HostRecord) -> usize {
    HOSTENT_HEADER
        + rec.name.len()
        + 1
        + list_size(&rec.aliases, 0)
        + list_size(&rec.addrs, rec.addr_len)
}

/// Serializes a host record into `scratch`.
///
/// Returns the populated size, or 0 when the scratch cannot grow (callers
/// map that to the insufficient-buffers error).
pub fn serialize_host(rec: &HostRecord, enc: PtrEncoding, scratch: &mut Scratch) -> usize {
    let size = host_record_size(rec);
    let Some(buf) = scratch.request(size) else {
        return 0;
    };

    let mut p = HOSTENT_HEADER;
    let name_off = p;
    buf[p..p + rec.name.len()].copy_from_slice(&rec.name);
    p += rec.name.len() + 1;
    let aliases_off = p;
    p += write_list(buf, p, &rec.aliases, 0, enc);
    let addrs_off = p;
    write_list(buf, p, &rec.addrs, rec.addr_len, enc);

    put_u32(buf, 0, enc.encode(name_off as u32));
    put_u32(buf, 4, enc.encode(aliases_off as u32));
    put_i16(buf, 8, rec.addrtype);
    put_i16(buf, 10, rec.addr_len as i16);
    put_u32(buf, 12, enc.encode(addrs_off as u32));
    size
}

/// Total marshalled size of a protocol record under the encoding's layout.
#[must_use]
pub fn proto_record_size(rec: &ProtoRecord, layout: RecordLayout) -> usize {
    let header = match layout {
        RecordLayout::Narrow => PROTOENT_HEADER_NARROW,
        RecordLayout::Wide => PROTOENT_HEADER_WIDE,
    };
    header + rec.name.len() + 1 + list_size(&rec.aliases, 0)
}

/// Serializes a protocol record into `scratch`. Returns the populated size,
/// or 0 when the scratch cannot grow.
pub fn serialize_proto(rec: &ProtoRecord, enc: PtrEncoding, scratch: &mut Scratch) -> usize {
    let layout = enc.layout();
    let size = proto_record_size(rec, layout);
    let Some(buf) = scratch.request(size) else {
        return 0;
    };
    let header = match layout {
        RecordLayout::Narrow => PROTOENT_HEADER_NARROW,
        RecordLayout::Wide => PROTOENT_HEADER_WIDE,
    };

    let mut p = header;
    let name_off = p;
    buf[p..p + rec.name.len()].copy_from_slice(&rec.name);
    p += rec.name.len() + 1;
    let aliases_off = p;
    write_list(buf, p, &rec.aliases, 0, enc);

    put_u32(buf, 0, enc.encode(name_off as u32));
    put_u32(buf, 4, enc.encode(aliases_off as u32));
    put_i16(buf, 8, rec.proto);
    size
}

/// Total marshalled size of a service record under the encoding's layout.
#[must_use]
pub fn serv_record_size(rec: &ServRecord, layout: RecordLayout) -> usize {
    let header = match layout {
        RecordLayout::Narrow => SERVENT_HEADER_NARROW,
        RecordLayout::Wide => SERVENT_HEADER_WIDE,
    };
    header + rec.name.len() + 1 + rec.proto.len() + 1 + list_size(&rec.aliases, 0)
}

/// Serializes a service record into `scratch`. Returns the populated size,
/// or 0 when the scratch cannot grow.
pub fn serialize_serv(rec: &ServRecord, enc: PtrEncoding, scratch: &mut Scratch) -> usize {
    let layout = enc.layout();
    let size = serv_record_size(rec, layout);
    let Some(buf) = scratch.request(size) else {
        return 0;
    };
    let (header, proto_field) = match layout {
        RecordLayout::Narrow => (SERVENT_HEADER_NARROW, 10),
        RecordLayout::Wide => (SERVENT_HEADER_WIDE, 12),
    };

    let mut p = header;
    let name_off = p;
    buf[p..p + rec.name.len()].copy_from_slice(&rec.name);
    p += rec.name.len() + 1;
    let proto_off = p;
    buf[p..p + rec.proto.len()].copy_from_slice(&rec.proto);
    p += rec.proto.len() + 1;
    let aliases_off = p;
    write_list(buf, p, &rec.aliases, 0, enc);

    put_u32(buf, 0, enc.encode(name_off as u32));
    put_u32(buf, 4, enc.encode(aliases_off as u32));
    put_u16(buf, 8, rec.port);
    put_u32(buf, proto_field, enc.encode(proto_off as u32));
    size
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(s: &str) -> Vec<u8> {
        s.as_bytes().to_vec()
    }

    fn cstr_at(buf: &[u8], at: usize) -> &[u8] {
        let end = buf[at..].iter().position(|&b| b == 0).unwrap() + at;
        &buf[at..end]
    }

    fn sample_host() -> HostRecord {
        HostRecord {
            name: bytes("gateway.example"),
            aliases: vec![bytes("gw"), bytes("router")],
            addrtype: 2,
            addr_len: 4,
            addrs: vec![vec![10, 0, 0, 1], vec![10, 0, 0, 2], vec![10, 0, 0, 3]],
        }
    }

    #[test]
    fn zero_alias_proto_size_is_header_name_terminator() {
        let rec = ProtoRecord {
            name: bytes("tcp"),
            aliases: vec![],
            proto: 6,
        };
        let mut scratch = Scratch::new();
        let size = serialize_proto(&rec, PtrEncoding::Offset, &mut scratch);
        assert_eq!(size, PROTOENT_HEADER_WIDE + 3 + 1 + PTR_SIZE);

        // Alias pointer array sits right after the name and holds exactly
        // the terminating null entry.
        let buf = scratch.bytes();
        let aliases_off = read_u32(buf, 4) as usize;
        assert_eq!(aliases_off, PROTOENT_HEADER_WIDE + 3 + 1);
        assert_eq!(read_u32(buf, aliases_off), 0);
    }

    #[test]
    fn host_record_size_formula() {
        let rec = sample_host();
        let aliases: usize = rec.aliases.iter().map(|a| a.len() + 1).sum();
        let expected = HOSTENT_HEADER
            + rec.name.len()
            + 1
            + (rec.aliases.len() + 1) * PTR_SIZE
            + aliases
            + (rec.addrs.len() + 1) * PTR_SIZE
            + rec.addrs.len() * rec.addr_len;
        assert_eq!(host_record_size(&rec), expected);

        let mut scratch = Scratch::new();
        assert_eq!(serialize_host(&rec, PtrEncoding::Offset, &mut scratch), expected);
    }

    #[test]
    fn host_offset_mode_is_self_contained() {
        let rec = sample_host();
        let mut scratch = Scratch::new();
        let size = serialize_host(&rec, PtrEncoding::Offset, &mut scratch);
        assert!(size > 0);
        let buf = scratch.bytes();

        let name_off = read_u32(buf, 0) as usize;
        assert_eq!(cstr_at(buf, name_off), rec.name.as_slice());
        assert_eq!(read_u16(buf, 8), 2);
        assert_eq!(read_u16(buf, 10), 4);

        // Walk the alias array through its offsets.
        let aliases_off = read_u32(buf, 4) as usize;
        for (i, alias) in rec.aliases.iter().enumerate() {
            let entry = read_u32(buf, aliases_off + i * PTR_SIZE) as usize;
            assert_eq!(cstr_at(buf, entry), alias.as_slice());
        }
        assert_eq!(read_u32(buf, aliases_off + rec.aliases.len() * PTR_SIZE), 0);

        // And the address array.
        let addrs_off = read_u32(buf, 12) as usize;
        for (i, addr) in rec.addrs.iter().enumerate() {
            let entry = read_u32(buf, addrs_off + i * PTR_SIZE) as usize;
            assert_eq!(&buf[entry..entry + 4], addr.as_slice());
        }
        assert_eq!(read_u32(buf, addrs_off + rec.addrs.len() * PTR_SIZE), 0);
    }

    #[test]
    fn linear_and_segmented_rebase_pointers() {
        let rec = sample_host();
        let mut off_scratch = Scratch::new();
        let mut lin_scratch = Scratch::new();
        let mut seg_scratch = Scratch::new();
        serialize_host(&rec, PtrEncoding::Offset, &mut off_scratch);
        serialize_host(&rec, PtrEncoding::Linear { base: 0x4000_0000 }, &mut lin_scratch);
        serialize_host(&rec, PtrEncoding::Segmented { base: 0x1234_0000 }, &mut seg_scratch);

        let off_name = read_u32(off_scratch.bytes(), 0);
        assert_eq!(read_u32(lin_scratch.bytes(), 0), 0x4000_0000 + off_name);
        assert_eq!(read_u32(seg_scratch.bytes(), 0), 0x1234_0000 + off_name);
    }

    #[test]
    fn empty_address_list_has_lone_terminator() {
        let rec = HostRecord {
            name: bytes("lonely"),
            aliases: vec![],
            addrtype: 2,
            addr_len: 4,
            addrs: vec![],
        };
        let mut scratch = Scratch::new();
        let size = serialize_host(&rec, PtrEncoding::Offset, &mut scratch);
        assert_eq!(
            size,
            HOSTENT_HEADER + rec.name.len() + 1 + PTR_SIZE + PTR_SIZE
        );
        let buf = scratch.bytes();
        let addrs_off = read_u32(buf, 12) as usize;
        assert_eq!(read_u32(buf, addrs_off), 0);
    }

    #[test]
    fn serv_header_depends_on_layout() {
        let rec = ServRecord {
            name: bytes("http"),
            aliases: vec![bytes("www")],
            port: 80u16.to_be(),
            proto: bytes("tcp"),
        };
        assert_eq!(
            serv_record_size(&rec, RecordLayout::Wide) - serv_record_size(&rec, RecordLayout::Narrow),
            SERVENT_HEADER_WIDE - SERVENT_HEADER_NARROW
        );

        let mut scratch = Scratch::new();
        let size = serialize_serv(&rec, PtrEncoding::Segmented { base: 0 }, &mut scratch);
        assert_eq!(size, serv_record_size(&rec, RecordLayout::Narrow));
        let buf = scratch.bytes();
        // Narrow layout: proto pointer packed directly after the port.
        let proto_off = read_u32(buf, 10) as usize;
        assert_eq!(cstr_at(buf, proto_off), b"tcp");
        assert_eq!(read_u16(buf, 8), 80u16.to_be());
    }

    #[test]
    fn serv_wide_layout_field_positions() {
        let rec = ServRecord {
            name: bytes("domain"),
            aliases: vec![],
            port: 53u16.to_be(),
            proto: bytes("udp"),
        };
        let mut scratch = Scratch::new();
        serialize_serv(&rec, PtrEncoding::Offset, &mut scratch);
        let buf = scratch.bytes();
        let name_off = read_u32(buf, 0) as usize;
        assert_eq!(name_off, SERVENT_HEADER_WIDE);
        assert_eq!(cstr_at(buf, name_off), b"domain");
        let proto_off = read_u32(buf, 12) as usize;
        assert_eq!(cstr_at(buf, proto_off), b"udp");
    }

    #[test]
    fn scratch_grows_and_never_shrinks() {
        let mut scratch = Scratch::new();
        assert!(scratch.request(100).is_some());
        assert_eq!(scratch.capacity(), 100);
        assert!(scratch.request(10).is_some());
        assert_eq!(scratch.capacity(), 100);
        assert!(scratch.request(250).is_some());
        assert_eq!(scratch.capacity(), 250);
    }

    #[test]
    fn scratch_reuse_zeroes_the_region() {
        let mut scratch = Scratch::new();
        let region = scratch.request(8).unwrap();
        region.fill(0xAA);
        let region = scratch.request(8).unwrap();
        assert!(region.iter().all(|&b| b == 0));
    }

    #[test]
    fn serialize_twice_reuses_capacity() {
        let rec = sample_host();
        let mut scratch = Scratch::new();
        let first = serialize_host(&rec, PtrEncoding::Offset, &mut scratch);
        let cap = scratch.capacity();
        let second = serialize_host(&rec, PtrEncoding::Offset, &mut scratch);
        assert_eq!(first, second);
        assert_eq!(scratch.capacity(), cap);
    }
}
