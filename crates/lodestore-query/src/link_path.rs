//! Link-path traversal.
//!
//! A [`LinkPath`] is the compiled form of a dotted chain of link,
//! link-list and backlink columns. Compilation records the chain of tables
//! crossed and whether the path consists solely of single links, which
//! lets per-row evaluation produce at most one target without a fan-out
//! buffer.
//!
//! A path may legally revisit tables (`parent.parent` chains); traversal
//! terminates because the hop list is finite, not through runtime cycle
//! detection.

use lodestore_store::GroupData;
use lodestore_types::{ColKey, ColumnType, ObjKey, TableKey};
use smallvec::SmallVec;

pub type LinkTargets = SmallVec<[ObjKey; 4]>;

#[derive(Debug, Clone)]
pub struct LinkPath {
    cols: Vec<ColKey>,
    tables: Vec<TableKey>,
    only_unary: bool,
}

impl LinkPath {
    /// An empty path: evaluation stays on the base table.
    pub fn none() -> Self {
        Self {
            cols: Vec::new(),
            tables: Vec::new(),
            only_unary: true,
        }
    }

    pub fn new(cols: Vec<ColKey>) -> Self {
        Self {
            cols,
            tables: Vec::new(),
            only_unary: true,
        }
    }

    /// (Re)compile the path against a base table: resolve the table chain
    /// and the unary-links property.
    pub fn set_base_table(&mut self, g: &GroupData, base: TableKey) {
        self.tables.clear();
        self.tables.push(base);
        self.only_unary = true;

        let mut table = base;
        for &col in &self.cols {
            let spec = g.table(table).spec(col);
            let ty = col.column_type();
            assert!(
                ty.is_link_type() || ty == ColumnType::Backlink,
                "link path hops must be link, link-list or backlink columns"
            );
            if ty == ColumnType::LinkList || ty == ColumnType::Backlink {
                self.only_unary = false;
            }
            table = spec.link().expect("link column carries link info").other_table;
            self.tables.push(table);
        }
    }

    #[inline]
    pub fn has_links(&self) -> bool {
        !self.cols.is_empty()
    }

    #[inline]
    pub fn hop_count(&self) -> usize {
        self.cols.len()
    }

    /// True iff every hop is a single link, so each source row reaches at
    /// most one target.
    #[inline]
    pub fn only_unary_links(&self) -> bool {
        self.only_unary
    }

    pub fn base_table(&self) -> TableKey {
        *self.tables.first().expect("path not compiled")
    }

    /// The table the last hop lands in (the base table for empty paths).
    pub fn target_table(&self) -> TableKey {
        *self.tables.last().expect("path not compiled")
    }

    /// Like [`Self::target_table`], falling back to `table` when the path
    /// has not been compiled yet.
    pub fn target_table_or(&self, table: TableKey) -> TableKey {
        self.tables.last().copied().unwrap_or(table)
    }

    /// Walk the path from `key`, feeding each reached target to `sink`.
    /// The sink returns false to stop the fan-out early.
    pub fn for_each_target(&self, g: &GroupData, key: ObjKey, sink: &mut dyn FnMut(ObjKey) -> bool) {
        if self.cols.is_empty() {
            sink(key);
            return;
        }
        self.map_links(g, 0, key, sink);
    }

    /// All target keys reachable from `key`.
    pub fn get_links(&self, g: &GroupData, key: ObjKey) -> LinkTargets {
        let mut out = LinkTargets::new();
        self.for_each_target(g, key, &mut |k| {
            out.push(k);
            true
        });
        out
    }

    fn map_links(
        &self,
        g: &GroupData,
        hop: usize,
        key: ObjKey,
        sink: &mut dyn FnMut(ObjKey) -> bool,
    ) -> bool {
        let last = hop + 1 == self.cols.len();
        let col = self.cols[hop];
        let table = self.tables[hop];
        let Some((ci, row)) = g.table(table).locate(key) else {
            return true;
        };
        let cluster = g.table(table).cluster(ci);

        match col.column_type() {
            ColumnType::Link => {
                if let Some(k) = cluster.column(col.index()).link_at(row) {
                    if last {
                        return sink(k);
                    }
                    return self.map_links(g, hop + 1, k, sink);
                }
            }
            ColumnType::LinkList => {
                let targets: Vec<ObjKey> = cluster.column(col.index()).list_at(row).links().to_vec();
                for k in targets {
                    if last {
                        if !sink(k) {
                            return false;
                        }
                    } else if !self.map_links(g, hop + 1, k, sink) {
                        return false;
                    }
                }
            }
            ColumnType::Backlink => {
                let origins: Vec<ObjKey> = cluster.column(col.index()).backlinks_at(row).to_vec();
                for k in origins {
                    if last {
                        if !sink(k) {
                            return false;
                        }
                    } else if !self.map_links(g, hop + 1, k, sink) {
                        return false;
                    }
                }
            }
            _ => unreachable!("validated at compile time"),
        }
        true
    }

    /// The inverse walk: given a key in the path's final table, recover the
    /// set of source keys whose forward walk reaches it. Backlink hops are
    /// traversed as forward links and vice versa.
    pub fn origin_keys(&self, g: &GroupData, target: ObjKey) -> Vec<ObjKey> {
        self.origin_keys_from(g, target, 0)
    }

    fn origin_keys_from(&self, g: &GroupData, key: ObjKey, hop: usize) -> Vec<ObjKey> {
        if hop == self.cols.len() {
            return vec![key];
        }
        let keys = self.origin_keys_from(g, key, hop + 1);
        let col = self.cols[hop];
        let table = self.tables[hop];
        let link = g
            .table(table)
            .spec(col)
            .link()
            .expect("link column carries link info");
        let mut out = Vec::new();

        if col.column_type() == ColumnType::Backlink {
            // Inverted, a backlink hop reads the forward link column on the
            // hop's target table.
            let fwd_table = link.other_table;
            let fwd_col = g.table(fwd_table).columns()[link.other_col as usize].key();
            for k in keys {
                let Some((ci, row)) = g.table(fwd_table).locate(k) else {
                    continue;
                };
                let cluster = g.table(fwd_table).cluster(ci);
                if fwd_col.is_list() {
                    out.extend_from_slice(cluster.column(fwd_col.index()).list_at(row).links());
                } else if let Some(t) = cluster.column(fwd_col.index()).link_at(row) {
                    out.push(t);
                }
            }
        } else {
            // Inverted, a forward hop reads the backlink column on the
            // target table.
            let target_table = link.other_table;
            let bl_idx = link.other_col as usize;
            for k in keys {
                let Some((ci, row)) = g.table(target_table).locate(k) else {
                    continue;
                };
                out.extend_from_slice(
                    g.table(target_table)
                        .cluster(ci)
                        .column(bl_idx)
                        .backlinks_at(row),
                );
            }
        }
        out
    }

    /// Dotted textual form, e.g. `friends.employer`.
    pub fn describe(&self, g: &GroupData) -> String {
        let mut parts = Vec::with_capacity(self.cols.len());
        for (i, &col) in self.cols.iter().enumerate() {
            let table = self.tables[i];
            parts.push(g.table(table).columns()[col.index()].name().to_owned());
        }
        parts.join(".")
    }
}
