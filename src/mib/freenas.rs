//! The FREENAS-MIB object layout.
//!
//! ```text
//! <base>.1            zfs
//!   zfs.1.1.1.<c>.<r>   zpoolEntry    (columns 2..15)
//!   zfs.2.1.1.<c>.<r>   datasetEntry  (columns 2..6)
//!   zfs.3.1.1.<c>.<r>   zvolEntry     (columns 2..6)
//!   zfs.4.{1..10}.0     ARC scalars
//!   zfs.5.{1..5}.0      L2ARC scalars
//!   zfs.6.{1..3}.0      ZIL scalars
//! ```

use super::{Mib, MibError, Oid, ScalarId, TableId, Value, ValueType};

/// `.1.3.6.1.4.1.50536`, the FreeNAS enterprise arc.
pub const DEFAULT_BASE_OID: [u32; 7] = [1, 3, 6, 1, 4, 1, 50536];

const POOL_COLUMNS: [(u32, ValueType); 14] = [
    (2, ValueType::DisplayString), // zpoolName
    (3, ValueType::Integer32),     // zpoolAllocationUnits
    (4, ValueType::Integer32),     // zpoolSize
    (5, ValueType::Integer32),     // zpoolUsed
    (6, ValueType::Integer32),     // zpoolAvailable
    (7, ValueType::Integer32),     // zpoolHealth
    (8, ValueType::Counter64),     // zpoolReadOps
    (9, ValueType::Counter64),     // zpoolWriteOps
    (10, ValueType::Counter64),    // zpoolReadBytes
    (11, ValueType::Counter64),    // zpoolWriteBytes
    (12, ValueType::Counter64),    // zpoolReadOps1sec
    (13, ValueType::Counter64),    // zpoolWriteOps1sec
    (14, ValueType::Counter64),    // zpoolReadBytes1sec
    (15, ValueType::Counter64),    // zpoolWriteBytes1sec
];

/// Shared by datasetEntry and zvolEntry.
const DATASET_COLUMNS: [(u32, ValueType); 5] = [
    (2, ValueType::DisplayString),
    (3, ValueType::Integer32),
    (4, ValueType::Integer32),
    (5, ValueType::Integer32),
    (6, ValueType::Integer32),
];

/// One zpoolEntry, already converted to wire types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolRow {
    pub name: String,
    pub allocation_units: i32,
    pub size: i32,
    pub used: i32,
    pub available: i32,
    pub health: i32,
    pub read_ops: u64,
    pub write_ops: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_ops_1sec: u64,
    pub write_ops_1sec: u64,
    pub read_bytes_1sec: u64,
    pub write_bytes_1sec: u64,
}

/// One datasetEntry or zvolEntry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetRow {
    pub name: String,
    pub allocation_units: i32,
    pub size: i32,
    pub used: i32,
    pub available: i32,
}

impl DatasetRow {
    fn cells(&self) -> Vec<Value> {
        vec![
            Value::DisplayString(self.name.clone()),
            Value::Integer32(self.allocation_units),
            Value::Integer32(self.size),
            Value::Integer32(self.used),
            Value::Integer32(self.available),
        ]
    }
}

/// ARC scalars. Sizes are KiB, counters are modulo 2^32.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArcScalars {
    pub size: u32,
    pub meta: u32,
    pub data: u32,
    pub hits: u32,
    pub misses: u32,
    pub c: u32,
    pub p: u32,
    pub miss_percent: String,
    pub cache_hit_ratio: String,
    pub cache_miss_ratio: String,
}

/// L2ARC scalars. Byte figures are KiB modulo 2^32.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct L2ArcScalars {
    pub hits: u32,
    pub misses: u32,
    pub read: u32,
    pub write: u32,
    pub size: u32,
}

/// ZIL operation counts over the three zilstat intervals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZilScalars {
    pub ops_1sec: u64,
    pub ops_5sec: u64,
    pub ops_10sec: u64,
}

/// The registry populated with the FREENAS-MIB tables and scalars.
#[derive(Debug)]
pub struct FreenasMib {
    mib: Mib,
    zfs: Oid,
    zpool_table: TableId,
    dataset_table: TableId,
    zvol_table: TableId,
    arc: [ScalarId; 10],
    l2arc: [ScalarId; 5],
    zil: [ScalarId; 3],
}

fn child(parent: &[u32], arcs: &[u32]) -> Oid {
    let mut oid = parent.to_vec();
    oid.extend_from_slice(arcs);
    oid
}

impl FreenasMib {
    /// Defines every object under `base`.
    pub fn new(base: &[u32]) -> Result<Self, MibError> {
        let zfs = child(base, &[1]);
        let mut mib = Mib::new();

        let zpool_table = mib.define_table("zpoolTable", child(&zfs, &[1, 1, 1]), &POOL_COLUMNS)?;
        let dataset_table =
            mib.define_table("datasetTable", child(&zfs, &[2, 1, 1]), &DATASET_COLUMNS)?;
        let zvol_table = mib.define_table("zvolTable", child(&zfs, &[3, 1, 1]), &DATASET_COLUMNS)?;

        let arc_defs = [
            ("zfsArcSize", ValueType::Unsigned32),
            ("zfsArcMeta", ValueType::Unsigned32),
            ("zfsArcData", ValueType::Unsigned32),
            ("zfsArcHits", ValueType::Unsigned32),
            ("zfsArcMisses", ValueType::Unsigned32),
            ("zfsArcC", ValueType::Unsigned32),
            ("zfsArcP", ValueType::Unsigned32),
            ("zfsArcMissPercent", ValueType::DisplayString),
            ("zfsArcCacheHitRatio", ValueType::DisplayString),
            ("zfsArcCacheMissRatio", ValueType::DisplayString),
        ];
        let l2arc_defs = [
            ("zfsL2ArcHits", ValueType::Counter32),
            ("zfsL2ArcMisses", ValueType::Counter32),
            ("zfsL2ArcRead", ValueType::Counter32),
            ("zfsL2ArcWrite", ValueType::Counter32),
            ("zfsL2ArcSize", ValueType::Unsigned32),
        ];
        let zil_defs = [
            ("zfsZilstatOps1sec", ValueType::Counter64),
            ("zfsZilstatOps5sec", ValueType::Counter64),
            ("zfsZilstatOps10sec", ValueType::Counter64),
        ];

        let arc = define_group(&mut mib, &child(&zfs, &[4]), arc_defs)?;
        let l2arc = define_group(&mut mib, &child(&zfs, &[5]), l2arc_defs)?;
        let zil = define_group(&mut mib, &child(&zfs, &[6]), zil_defs)?;

        Ok(Self {
            mib,
            zfs,
            zpool_table,
            dataset_table,
            zvol_table,
            arc,
            l2arc,
            zil,
        })
    }

    pub fn mib(&self) -> &Mib {
        &self.mib
    }

    /// OID of the `zfs` subtree.
    pub fn zfs_oid(&self) -> &[u32] {
        &self.zfs
    }

    /// Empties all three tables ahead of a fresh enumeration.
    pub fn clear_tables(&mut self) -> Result<(), MibError> {
        self.mib.clear_table(self.zpool_table)?;
        self.mib.clear_table(self.dataset_table)?;
        self.mib.clear_table(self.zvol_table)
    }

    pub fn add_pool(&mut self, row: &PoolRow) -> Result<u32, MibError> {
        let cells = vec![
            Value::DisplayString(row.name.clone()),
            Value::Integer32(row.allocation_units),
            Value::Integer32(row.size),
            Value::Integer32(row.used),
            Value::Integer32(row.available),
            Value::Integer32(row.health),
            Value::Counter64(row.read_ops),
            Value::Counter64(row.write_ops),
            Value::Counter64(row.read_bytes),
            Value::Counter64(row.write_bytes),
            Value::Counter64(row.read_ops_1sec),
            Value::Counter64(row.write_ops_1sec),
            Value::Counter64(row.read_bytes_1sec),
            Value::Counter64(row.write_bytes_1sec),
        ];
        self.mib.add_row(self.zpool_table, cells)
    }

    pub fn add_dataset(&mut self, row: &DatasetRow) -> Result<u32, MibError> {
        self.mib.add_row(self.dataset_table, row.cells())
    }

    pub fn add_zvol(&mut self, row: &DatasetRow) -> Result<u32, MibError> {
        self.mib.add_row(self.zvol_table, row.cells())
    }

    pub fn pool_count(&self) -> u32 {
        self.mib.row_count(self.zpool_table).unwrap_or(0)
    }

    pub fn dataset_count(&self) -> u32 {
        self.mib.row_count(self.dataset_table).unwrap_or(0)
    }

    pub fn zvol_count(&self) -> u32 {
        self.mib.row_count(self.zvol_table).unwrap_or(0)
    }

    pub fn set_arc(&mut self, arc: &ArcScalars) -> Result<(), MibError> {
        let values = [
            Value::Unsigned32(arc.size),
            Value::Unsigned32(arc.meta),
            Value::Unsigned32(arc.data),
            Value::Unsigned32(arc.hits),
            Value::Unsigned32(arc.misses),
            Value::Unsigned32(arc.c),
            Value::Unsigned32(arc.p),
            Value::DisplayString(arc.miss_percent.clone()),
            Value::DisplayString(arc.cache_hit_ratio.clone()),
            Value::DisplayString(arc.cache_miss_ratio.clone()),
        ];
        self.update_group(self.arc, values)
    }

    pub fn set_l2arc(&mut self, l2: &L2ArcScalars) -> Result<(), MibError> {
        let values = [
            Value::Counter32(l2.hits),
            Value::Counter32(l2.misses),
            Value::Counter32(l2.read),
            Value::Counter32(l2.write),
            Value::Unsigned32(l2.size),
        ];
        self.update_group(self.l2arc, values)
    }

    pub fn set_zil(&mut self, zil: &ZilScalars) -> Result<(), MibError> {
        let values = [
            Value::Counter64(zil.ops_1sec),
            Value::Counter64(zil.ops_5sec),
            Value::Counter64(zil.ops_10sec),
        ];
        self.update_group(self.zil, values)
    }

    fn update_group<const N: usize>(
        &mut self,
        ids: [ScalarId; N],
        values: [Value; N],
    ) -> Result<(), MibError> {
        for (id, value) in ids.into_iter().zip(values) {
            self.mib.update_scalar(id, value)?;
        }
        Ok(())
    }
}

/// Defines `<group>.1 .. <group>.N` in order.
fn define_group<const N: usize>(
    mib: &mut Mib,
    group: &[u32],
    defs: [(&str, ValueType); N],
) -> Result<[ScalarId; N], MibError> {
    let mut ids = Vec::with_capacity(N);
    for (arc, (name, value_type)) in (1u32..).zip(defs) {
        ids.push(mib.define_scalar(name, child(group, &[arc]), value_type)?);
    }
    ids.try_into().map_err(|_| MibError::UnknownHandle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mib::{format_oid, parse_oid};

    fn oid(text: &str) -> Oid {
        parse_oid(text).unwrap()
    }

    #[test]
    fn test_scalars_defined_at_zero() {
        let mib = FreenasMib::new(&DEFAULT_BASE_OID).unwrap();
        let objects = mib.mib();

        assert_eq!(
            objects.get(&oid(".1.3.6.1.4.1.50536.1.4.1.0")),
            Some(&Value::Unsigned32(0))
        );
        assert_eq!(
            objects.get(&oid(".1.3.6.1.4.1.50536.1.4.10.0")),
            Some(&Value::DisplayString(String::new()))
        );
        assert_eq!(
            objects.get(&oid(".1.3.6.1.4.1.50536.1.5.5.0")),
            Some(&Value::Unsigned32(0))
        );
        assert_eq!(
            objects.get(&oid(".1.3.6.1.4.1.50536.1.6.3.0")),
            Some(&Value::Counter64(0))
        );
        assert_eq!(objects.len(), 18);
    }

    #[test]
    fn test_pool_row_layout() {
        let mut mib = FreenasMib::new(&DEFAULT_BASE_OID).unwrap();
        let row = mib
            .add_pool(&PoolRow {
                name: "tank".to_string(),
                allocation_units: 4096,
                size: 4096,
                used: 2048,
                available: 2048,
                health: 0,
                read_bytes_1sec: 512,
                ..PoolRow::default()
            })
            .unwrap();
        assert_eq!(row, 0);

        let objects = mib.mib();
        let entry = ".1.3.6.1.4.1.50536.1.1.1.1";
        assert_eq!(
            objects.get(&oid(&format!("{entry}.2.0"))),
            Some(&Value::DisplayString("tank".to_string()))
        );
        assert_eq!(objects.get(&oid(&format!("{entry}.4.0"))), Some(&Value::Integer32(4096)));
        assert_eq!(objects.get(&oid(&format!("{entry}.7.0"))), Some(&Value::Integer32(0)));
        assert_eq!(objects.get(&oid(&format!("{entry}.14.0"))), Some(&Value::Counter64(512)));
        assert_eq!(objects.get(&oid(&format!("{entry}.16.0"))), None);
    }

    #[test]
    fn test_dataset_and_zvol_tables_are_separate() {
        let mut mib = FreenasMib::new(&DEFAULT_BASE_OID).unwrap();
        let row = DatasetRow {
            name: "tank/home".to_string(),
            allocation_units: 4096,
            size: 10,
            used: 5,
            available: 5,
        };
        mib.add_dataset(&row).unwrap();
        mib.add_zvol(&DatasetRow {
            name: "tank/vm0".to_string(),
            ..row.clone()
        })
        .unwrap();

        let objects = mib.mib();
        assert_eq!(
            objects.get(&oid(".1.3.6.1.4.1.50536.1.2.1.1.2.0")),
            Some(&Value::DisplayString("tank/home".to_string()))
        );
        assert_eq!(
            objects.get(&oid(".1.3.6.1.4.1.50536.1.3.1.1.2.0")),
            Some(&Value::DisplayString("tank/vm0".to_string()))
        );
        assert_eq!((mib.dataset_count(), mib.zvol_count()), (1, 1));
    }

    #[test]
    fn test_clear_tables() {
        let mut mib = FreenasMib::new(&DEFAULT_BASE_OID).unwrap();
        mib.add_pool(&PoolRow::default()).unwrap();
        mib.add_dataset(&DatasetRow::default()).unwrap();
        mib.clear_tables().unwrap();

        assert_eq!(mib.pool_count(), 0);
        assert_eq!(mib.dataset_count(), 0);
        assert_eq!(mib.mib().len(), 18);
    }

    #[test]
    fn test_set_scalar_groups() {
        let mut mib = FreenasMib::new(&DEFAULT_BASE_OID).unwrap();
        mib.set_arc(&ArcScalars {
            size: 1048576,
            miss_percent: "20.0".to_string(),
            ..ArcScalars::default()
        })
        .unwrap();
        mib.set_l2arc(&L2ArcScalars {
            hits: 5,
            ..L2ArcScalars::default()
        })
        .unwrap();
        mib.set_zil(&ZilScalars {
            ops_1sec: 1,
            ops_5sec: 5,
            ops_10sec: 10,
        })
        .unwrap();

        let objects = mib.mib();
        assert_eq!(
            objects.get(&oid(".1.3.6.1.4.1.50536.1.4.1.0")),
            Some(&Value::Unsigned32(1048576))
        );
        assert_eq!(
            objects.get(&oid(".1.3.6.1.4.1.50536.1.4.8.0")),
            Some(&Value::DisplayString("20.0".to_string()))
        );
        assert_eq!(
            objects.get(&oid(".1.3.6.1.4.1.50536.1.5.1.0")),
            Some(&Value::Counter32(5))
        );
        assert_eq!(
            objects.get(&oid(".1.3.6.1.4.1.50536.1.6.2.0")),
            Some(&Value::Counter64(5))
        );
    }

    #[test]
    fn test_custom_base() {
        let mib = FreenasMib::new(&[1, 3, 6, 1, 4, 1, 99999]).unwrap();
        assert_eq!(format_oid(mib.zfs_oid()), ".1.3.6.1.4.1.99999.1");
        let (first, _) = mib.mib().get_next(&[1, 3, 6, 1, 4, 1, 99999]).unwrap();
        assert_eq!(format_oid(first), ".1.3.6.1.4.1.99999.1.4.1.0");
    }
}
