//! Column family definitions for RocksDB.
//!
//! Each column family is one keyspace of the index:
//! - nav_order: ordered set, one empty-valued key per record (see `keys`)
//! - nav_members: record id -> its current ordered-set key
//! - thumbnails: record id -> framed thumbnail blob
//! - index_state: record id -> JSON `CollectionIndexState`
//! - index_meta: run bookkeeping

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for the ordered set
pub const CF_NAV_ORDER: &str = "nav_order";

/// Column family name for ordered-set membership lookups
pub const CF_NAV_MEMBERS: &str = "nav_members";

/// Column family name for the thumbnail hash map
pub const CF_THUMBNAILS: &str = "thumbnails";

/// Column family name for per-record index state
pub const CF_INDEX_STATE: &str = "index_state";

/// Column family name for run metadata
pub const CF_INDEX_META: &str = "index_meta";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[
    CF_NAV_ORDER,
    CF_NAV_MEMBERS,
    CF_THUMBNAILS,
    CF_INDEX_STATE,
    CF_INDEX_META,
];

/// Column families holding per-record index data
pub const RECORD_CF_NAMES: &[&str] = &[CF_NAV_ORDER, CF_NAV_MEMBERS, CF_THUMBNAILS, CF_INDEX_STATE];

/// Thumbnails are already-compressed images; skip block compression
fn thumbnail_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::None);
    opts
}

/// Small JSON values compress well
fn state_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_NAV_ORDER, Options::default()),
        ColumnFamilyDescriptor::new(CF_NAV_MEMBERS, Options::default()),
        ColumnFamilyDescriptor::new(CF_THUMBNAILS, thumbnail_options()),
        ColumnFamilyDescriptor::new(CF_INDEX_STATE, state_options()),
        ColumnFamilyDescriptor::new(CF_INDEX_META, Options::default()),
    ]
}
