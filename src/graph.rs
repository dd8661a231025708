//! The graph engine.
//!
//! A graph is a right-continuous step function from moments to non-negative
//! integers, stored as a sorted node table. Querying at time `t` returns
//! the value of the latest node at or before `t`, or the first node's value
//! when every node is still in the future.
//!
//! Graphs are built region by region through a single accumulator. Ramps
//! and derived regions cannot be resolved until the start of the *next*
//! region is known, so the accumulator keeps a one-slot region buffer:
//! every `add_*` call first flushes the buffered region using the new
//! region's start as its end, and `end` flushes it knowing there is no
//! successor. Constant graphs bypass all of this and are interned in a
//! value-to-graph cache so that repeated constants share one node table.

use crate::error::{LibError, LibResult};
use crate::moment;
use std::collections::BTreeMap;

/// Maximum number of nodes in a finished graph.
const GRAPH_MAX_NODES: usize = 16_384;

/// An owning index into the [`GraphStore`].
///
/// Identity is meaningful: constant graphs are interned, so two
/// `constant(v)` calls with equal `v` return equal ids.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct GraphId(pub(crate) u32);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Node {
    t: i32,
    v: i32,
}

/// An immutable finished graph.
#[derive(Debug)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    /// Index of the latest node with time at or before `t`, if any.
    fn seek(&self, t: i32) -> Option<usize> {
        let idx = self.nodes.partition_point(|n| n.t <= t);
        if idx == 0 {
            None
        } else {
            Some(idx - 1)
        }
    }

    fn query(&self, t: i32) -> i32 {
        let i = self.seek(t).unwrap_or(0);
        self.nodes[i].v
    }

    /// Render for the script `print` diagnostic: `(t,v) (t,v)`.
    pub fn display(&self) -> String {
        let mut s = String::new();
        for (i, n) in self.nodes.iter().enumerate() {
            if i > 0 {
                s.push(' ');
            }
            s.push_str(&format!("({},{})", n.t, n.v));
        }
        s
    }
}

/// A buffered region waiting for its successor before it can be resolved.
#[derive(Clone, Copy, Debug)]
enum Region {
    Constant {
        t: i32,
        v: i32,
    },
    Ramp {
        t: i32,
        a: i32,
        b: i32,
        step: i32,
        log: bool,
    },
    Derived {
        t: i32,
        src: GraphId,
        t_src: i32,
        num: i32,
        denom: i32,
        c: i32,
        min: i32,
        max: Option<i32>,
    },
}

impl Region {
    fn start(&self) -> i32 {
        match *self {
            Region::Constant { t, .. } => t,
            Region::Ramp { t, .. } => t,
            Region::Derived { t, .. } => t,
        }
    }
}

#[derive(Debug, Default)]
struct Accum {
    nodes: Vec<Node>,
    /// Time of the last append, including appends suppressed because the
    /// value did not change.
    last_t: Option<i32>,
    buffered: Option<(Region, i64)>,
}

impl Accum {
    fn append(&mut self, t: i32, v: i32, line: i64) -> LibResult<()> {
        if v < 0 {
            return Err(range_err!(line, "Negative values not allowed in graphs"));
        }
        if let Some(last) = self.last_t {
            if t <= last {
                return Err(LibError::NonChronological {
                    what: String::from("Graph must be ascending chronological"),
                    line: crate::error::src_line(line),
                });
            }
        }
        self.last_t = Some(t);

        if let Some(prev) = self.nodes.last() {
            // the step function already carries this value forward
            if prev.v == v {
                return Ok(());
            }
        }
        if self.nodes.len() >= GRAPH_MAX_NODES {
            return Err(range_err!(line, "Graph too complex"));
        }
        self.nodes.push(Node { t, v });
        Ok(())
    }
}

/// Per-compilation arena of graphs, the constant cache and the single
/// graph accumulator.
#[derive(Debug, Default)]
pub struct GraphStore {
    graphs: Vec<Graph>,
    cache: BTreeMap<i32, GraphId>,
    accum: Option<Accum>,
}

impl GraphStore {
    pub fn new() -> GraphStore {
        GraphStore::default()
    }

    fn intern(&mut self, nodes: Vec<Node>) -> GraphId {
        let id = GraphId(self.graphs.len() as u32);
        self.graphs.push(Graph { nodes });
        id
    }

    /// A constant graph, shared through the cache.
    pub fn constant(&mut self, v: i32, line: i64) -> LibResult<GraphId> {
        if v < 0 {
            return Err(range_err!(line, "Graph values must be zero or greater"));
        }
        if let Some(&id) = self.cache.get(&v) {
            return Ok(id);
        }
        let id = self.intern(vec![Node { t: 0, v }]);
        self.cache.insert(v, id);
        Ok(id)
    }

    pub fn get(&self, id: GraphId) -> &Graph {
        &self.graphs[id.0 as usize]
    }

    /// Value of a graph at a moment.
    pub fn query(&self, id: GraphId, t: i32) -> i32 {
        self.get(id).query(t)
    }

    fn accum_mut(&mut self, line: i64) -> LibResult<&mut Accum> {
        self.accum.as_mut().ok_or(LibError::GroupConstraint {
            what: String::from("Graph accumulator not loaded"),
            line: crate::error::src_line(line),
        })
    }

    /// Open a graph definition.
    pub fn begin(&mut self, line: i64) -> LibResult<()> {
        if self.accum.is_some() {
            return Err(LibError::GroupConstraint {
                what: String::from("Graph accumulator already loaded"),
                line: crate::error::src_line(line),
            });
        }
        self.accum = Some(Accum::default());
        Ok(())
    }

    /// Flush the buffered region, if any, knowing the start of its
    /// successor (`None` means the buffered region is the last one).
    /// Diagnostics cite the line the region was buffered on.
    fn resolve(&mut self, t_next: Option<i32>) -> LibResult<()> {
        let acc = self.accum.as_mut().ok_or_else(|| internal!())?;
        let (region, region_line) = match acc.buffered.take() {
            Some(b) => b,
            None => return Ok(()),
        };

        if let Some(tn) = t_next {
            if tn <= region.start() {
                return Err(LibError::NonChronological {
                    what: String::from("Graph regions must be chronological"),
                    line: crate::error::src_line(region_line),
                });
            }
        }

        match region {
            Region::Constant { t, v } => {
                let acc = self.accum.as_mut().ok_or_else(|| internal!())?;
                acc.append(t, v, region_line)?;
            }
            Region::Ramp { t, a, b, step, log } => {
                let tn = t_next.ok_or(LibError::RampAtEnd {
                    line: crate::error::src_line(region_line),
                })?;
                let acc = self.accum.as_mut().ok_or_else(|| internal!())?;
                acc.append(t, a, region_line)?;

                let (ts, part) = moment::unpack(t);
                let te = moment::subquantum(tn);

                // sample at step-multiple subquanta strictly between the
                // (rounded-down) region start and the successor's start
                let step64 = i64::from(step);
                let mut cur = i64::from(ts).div_euclid(step64) * step64 + step64;
                while cur < i64::from(te) {
                    let f = (cur as f64 - f64::from(ts)) / (f64::from(te) - f64::from(ts));
                    let f = f.max(0.0).min(1.0);
                    let raw = if log {
                        log_interp(f64::from(a), f64::from(b), f)
                    } else {
                        f64::from(a) + (f64::from(b) - f64::from(a)) * f
                    };
                    let mut v = raw.floor();
                    if !(v >= 0.0) {
                        v = 0.0;
                    } else if !(v <= f64::from(i32::MAX)) {
                        v = f64::from(i32::MAX);
                    }
                    let node_t = moment::pack(cur as i32, part, region_line)?;
                    acc.append(node_t, v as i32, region_line)?;
                    cur += step64;
                }
            }
            Region::Derived {
                t,
                src,
                t_src,
                num,
                denom,
                c,
                min,
                max,
            } => {
                // end of the source window; an overflow of the source
                // range means the window is unbounded
                let src_end = t_next.and_then(|tn| {
                    let wide = i64::from(tn) - i64::from(t) + i64::from(t_src);
                    if wide >= i64::from(i32::MIN) && wide <= i64::from(i32::MAX) {
                        Some(wide as i32)
                    } else {
                        None
                    }
                });

                let src_nodes = collect_track(self.get(src), t_src, src_end, None);
                let acc = self.accum.as_mut().ok_or_else(|| internal!())?;
                for (t_cb, v_cb) in src_nodes {
                    let rel = i64::from(t_cb) - i64::from(t_src);
                    let dst = i64::from(t) + rel;
                    if dst < i64::from(i32::MIN) || dst > i64::from(i32::MAX) {
                        return Err(LibError::Overflow {
                            line: crate::error::src_line(region_line),
                        });
                    }
                    let mut v = clamp_i32(i64::from(v_cb) * i64::from(num) / i64::from(denom));
                    v = clamp_i32(i64::from(v) + i64::from(c));
                    if v < min {
                        v = min;
                    }
                    if let Some(mx) = max {
                        if v > mx {
                            v = mx;
                        }
                    }
                    acc.append(dst as i32, v, region_line)?;
                }
            }
        }
        Ok(())
    }

    fn buffer(&mut self, region: Region, line: i64) -> LibResult<()> {
        self.resolve(Some(region.start()))?;
        let acc = self.accum_mut(line)?;
        acc.buffered = Some((region, line));
        Ok(())
    }

    /// Supply a constant region anchored at moment `t`.
    pub fn add_constant(&mut self, t: i32, v: i32, line: i64) -> LibResult<()> {
        self.accum_mut(line)?;
        if v < 0 {
            return Err(range_err!(line, "Graph values must be zero or greater"));
        }
        self.buffer(Region::Constant { t, v }, line)
    }

    /// Supply a ramp region from `a` to `b`, sampled every `step`
    /// subquanta, with linear or logarithmic interpolation.
    pub fn add_ramp(
        &mut self,
        t: i32,
        a: i32,
        b: i32,
        step: i32,
        log: bool,
        line: i64,
    ) -> LibResult<()> {
        self.accum_mut(line)?;
        if a < 0 || b < 0 {
            return Err(range_err!(line, "Graph values must be zero or greater"));
        }
        if step < 1 {
            return Err(range_err!(line, "Graph step distance must be at least one"));
        }
        if a == b {
            return self.add_constant(t, a, line);
        }
        self.buffer(Region::Ramp { t, a, b, step, log }, line)
    }

    /// Supply a region derived from another graph: values from `src`
    /// starting at `t_src` are scaled by `num/denom`, offset by `c` and
    /// clamped to `min..=max` (`max == None` meaning unbounded).
    #[allow(clippy::too_many_arguments)]
    pub fn add_derived(
        &mut self,
        t: i32,
        src: GraphId,
        t_src: i32,
        num: i32,
        denom: i32,
        c: i32,
        min: i32,
        max: Option<i32>,
        line: i64,
    ) -> LibResult<()> {
        self.accum_mut(line)?;
        if num < 0 {
            return Err(range_err!(line, "Graph region numerator may not be negative"));
        }
        if denom < 1 {
            return Err(range_err!(line, "Graph region denominator must be at least 1"));
        }
        if min < 0 {
            return Err(range_err!(line, "Graph region minimum may not be negative"));
        }
        if let Some(mx) = max {
            if mx < 0 {
                return Err(range_err!(line, "Invalid graph region maximum"));
            }
        }
        self.buffer(
            Region::Derived {
                t,
                src,
                t_src,
                num,
                denom,
                c,
                min,
                max,
            },
            line,
        )
    }

    /// Close the definition and intern the finished graph.
    pub fn end(&mut self, line: i64) -> LibResult<GraphId> {
        self.accum_mut(line)?;
        self.resolve(None)?;
        let acc = self.accum.take().ok_or_else(|| internal!())?;
        match acc.nodes.len() {
            0 => Err(LibError::EmptyGraph {
                line: crate::error::src_line(line),
            }),
            1 => self.constant(acc.nodes[0].v, line),
            _ => Ok(self.intern(acc.nodes)),
        }
    }

    /// Report every change of a graph's value over a time window.
    ///
    /// The callback first receives a synthetic node at `t_start` carrying
    /// the value observed there (suppressed when `v_start` is given and
    /// already equals it), then every real node in `(t_start, t_end]`.
    pub fn track<F>(
        &self,
        id: GraphId,
        t_start: i32,
        t_end: Option<i32>,
        v_start: Option<i32>,
        mut f: F,
    ) -> LibResult<()>
    where
        F: FnMut(i32, i32) -> LibResult<()>,
    {
        if let Some(te) = t_end {
            if te < t_start {
                return Err(internal!());
            }
        }
        for (t, v) in collect_track(self.get(id), t_start, t_end, v_start) {
            f(t, v)?;
        }
        Ok(())
    }
}

/// Shared tracking walk over a graph's node table.
fn collect_track(g: &Graph, t_start: i32, t_end: Option<i32>, v_start: Option<i32>) -> Vec<(i32, i32)> {
    let mut out = Vec::new();
    let i = g.seek(t_start).unwrap_or(0);
    let first_v = g.nodes[i].v;
    if v_start != Some(first_v) {
        out.push((t_start, first_v));
    }
    for n in &g.nodes[i + 1..] {
        if let Some(te) = t_end {
            if n.t > te {
                break;
            }
        }
        if n.t < t_start {
            continue;
        }
        out.push((n.t, n.v));
    }
    out
}

fn clamp_i32(v: i64) -> i32 {
    if v < i64::from(i32::MIN) {
        i32::MIN
    } else if v > i64::from(i32::MAX) {
        i32::MAX
    } else {
        v as i32
    }
}

/// `exp(ln(a+1) + f * (ln(b+1) - ln(a+1))) - 1`
fn log_interp(a: f64, b: f64, f: f64) -> f64 {
    let lo = (a + 1.0).ln();
    let hi = (b + 1.0).ln();
    (lo + f * (hi - lo)).exp() - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moment::{pack, Part};

    fn m(subq: i32) -> i32 {
        pack(subq, Part::Middle, -1).unwrap()
    }

    #[test]
    fn constant_graphs_interned() {
        let mut st = GraphStore::new();
        let a = st.constant(64, -1).unwrap();
        let b = st.constant(64, -1).unwrap();
        let c = st.constant(65, -1).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(st.query(a, i32::MIN), 64);
        assert_eq!(st.query(a, i32::MAX), 64);
        assert!(st.constant(-1, -1).is_err());
    }

    #[test]
    fn query_before_first_node_uses_first_value() {
        let mut st = GraphStore::new();
        st.begin(-1).unwrap();
        st.add_constant(m(100), 10, -1).unwrap();
        st.add_constant(m(200), 20, -1).unwrap();
        let g = st.end(-1).unwrap();
        assert_eq!(st.query(g, m(0)), 10);
        assert_eq!(st.query(g, m(100)), 10);
        assert_eq!(st.query(g, m(150)), 10);
        assert_eq!(st.query(g, m(200)), 20);
        assert_eq!(st.query(g, m(10_000)), 20);
    }

    #[test]
    fn single_region_collapses_to_cached_constant() {
        let mut st = GraphStore::new();
        let cached = st.constant(42, -1).unwrap();
        st.begin(-1).unwrap();
        st.add_constant(m(700), 42, -1).unwrap();
        let g = st.end(-1).unwrap();
        assert_eq!(g, cached);
    }

    #[test]
    fn empty_graph_rejected() {
        let mut st = GraphStore::new();
        st.begin(-1).unwrap();
        assert!(st.end(-1).is_err());
    }

    #[test]
    fn ramp_at_end_rejected() {
        let mut st = GraphStore::new();
        st.begin(-1).unwrap();
        st.add_ramp(m(0), 0, 10, 8, false, -1).unwrap();
        assert!(st.end(-1).is_err());
    }

    #[test]
    fn regions_must_be_chronological() {
        let mut st = GraphStore::new();
        st.begin(-1).unwrap();
        st.add_constant(m(100), 1, -1).unwrap();
        assert!(st.add_constant(m(100), 2, -1).is_err());
    }

    #[test]
    fn flat_ramp_becomes_constant() {
        let mut st = GraphStore::new();
        st.begin(-1).unwrap();
        st.add_ramp(m(0), 7, 7, 1, false, -1).unwrap();
        let g = st.end(-1).unwrap();
        assert_eq!(g, st.constant(7, -1).unwrap());
    }

    #[test]
    fn ramp_between_constants() {
        // constant 64 at 0, linear ramp 64->0 over subquanta 800..1600
        // stepping by 8, constant 0 from 1600
        let mut st = GraphStore::new();
        st.begin(-1).unwrap();
        st.add_constant(m(0), 64, -1).unwrap();
        st.add_ramp(m(800), 64, 0, 8, false, -1).unwrap();
        st.add_constant(m(1600), 0, -1).unwrap();
        let g = st.end(-1).unwrap();

        assert_eq!(st.query(g, m(400)), 64);
        assert_eq!(st.query(g, m(1600)), 0);
        let mid = st.query(g, m(1200));
        assert!(mid > 0 && mid < 64, "got {}", mid);
        // linear formula at the exact midpoint
        assert_eq!(mid, 32);
    }

    #[test]
    fn ramp_samples_on_step_boundaries() {
        let mut st = GraphStore::new();
        st.begin(-1).unwrap();
        st.add_ramp(m(10), 0, 100, 16, false, -1).unwrap();
        st.add_constant(m(50), 100, -1).unwrap();
        let g = st.end(-1).unwrap();
        // samples at 16, 32, 48 with f = (t-10)/40
        assert_eq!(st.query(g, m(10)), 0);
        assert_eq!(st.query(g, m(16)), 15);
        assert_eq!(st.query(g, m(32)), 55);
        assert_eq!(st.query(g, m(48)), 95);
        assert_eq!(st.query(g, m(50)), 100);
    }

    #[test]
    fn log_ramp_is_monotone_and_bounded() {
        let mut st = GraphStore::new();
        st.begin(-1).unwrap();
        st.add_ramp(m(0), 1, 127, 8, true, -1).unwrap();
        st.add_constant(m(256), 127, -1).unwrap();
        let g = st.end(-1).unwrap();
        let mut prev = 0;
        for sub in (0..256).step_by(8) {
            let v = st.query(g, m(sub));
            assert!(v >= prev);
            assert!(v <= 127);
            prev = v;
        }
        // log interpolation lags the straight line in the first half
        let lin_mid = 1 + (127 - 1) / 2;
        assert!(st.query(g, m(128)) < lin_mid);
    }

    #[test]
    fn derived_region_scales_and_shifts() {
        let mut st = GraphStore::new();
        st.begin(-1).unwrap();
        st.add_constant(m(0), 10, -1).unwrap();
        st.add_constant(m(100), 20, -1).unwrap();
        st.add_constant(m(200), 30, -1).unwrap();
        let src = st.end(-1).unwrap();

        st.begin(-1).unwrap();
        // copy src starting at subq 0 into destination subq 1000,
        // halving values and adding 1
        st.add_derived(m(1000), src, m(0), 1, 2, 1, 0, None, -1).unwrap();
        st.add_constant(m(1300), 99, -1).unwrap();
        let g = st.end(-1).unwrap();

        assert_eq!(st.query(g, m(1000)), 6);
        assert_eq!(st.query(g, m(1100)), 11);
        assert_eq!(st.query(g, m(1200)), 16);
        assert_eq!(st.query(g, m(1300)), 99);
    }

    #[test]
    fn derived_window_is_bounded_by_next_region() {
        let mut st = GraphStore::new();
        st.begin(-1).unwrap();
        st.add_constant(m(0), 1, -1).unwrap();
        st.add_constant(m(50), 2, -1).unwrap();
        st.add_constant(m(150), 3, -1).unwrap();
        let src = st.end(-1).unwrap();

        st.begin(-1).unwrap();
        st.add_derived(m(0), src, m(0), 1, 1, 0, 0, None, -1).unwrap();
        st.add_constant(m(300), 9, -1).unwrap();
        let g = st.end(-1).unwrap();
        // the node at src subq 150 maps to dst subq 150 < 300, included;
        // then the constant region overrides from 300
        assert_eq!(st.query(g, m(140)), 2);
        assert_eq!(st.query(g, m(150)), 3);
        assert_eq!(st.query(g, m(300)), 9);
    }

    #[test]
    fn derived_clamps_to_min_max() {
        let mut st = GraphStore::new();
        st.begin(-1).unwrap();
        st.add_constant(m(0), 0, -1).unwrap();
        st.add_constant(m(10), 100, -1).unwrap();
        let src = st.end(-1).unwrap();

        st.begin(-1).unwrap();
        st.add_derived(m(0), src, m(0), 2, 1, 0, 10, Some(150), -1).unwrap();
        st.add_constant(m(1000), 0, -1).unwrap();
        let g = st.end(-1).unwrap();
        assert_eq!(st.query(g, m(0)), 10); // 0*2 clamped up to min
        assert_eq!(st.query(g, m(10)), 150); // 200 clamped down to max
    }

    #[test]
    fn track_reports_initial_and_changes() {
        let mut st = GraphStore::new();
        st.begin(-1).unwrap();
        st.add_constant(m(0), 5, -1).unwrap();
        st.add_constant(m(100), 9, -1).unwrap();
        st.add_constant(m(200), 5, -1).unwrap();
        let g = st.end(-1).unwrap();

        let mut seen = Vec::new();
        st.track(g, m(50), Some(m(150)), None, |t, v| {
            seen.push((t, v));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![(m(50), 5), (m(100), 9)]);

        seen.clear();
        st.track(g, m(50), Some(m(150)), Some(5), |t, v| {
            seen.push((t, v));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![(m(100), 9)]);
    }

    #[test]
    fn equal_value_nodes_are_suppressed() {
        let mut st = GraphStore::new();
        st.begin(-1).unwrap();
        st.add_constant(m(0), 3, -1).unwrap();
        st.add_constant(m(10), 3, -1).unwrap();
        st.add_constant(m(20), 4, -1).unwrap();
        let g = st.end(-1).unwrap();
        // the suppressed node still advanced the chronology cursor, and
        // the finished graph has only the two change points
        assert_eq!(st.get(g).nodes.len(), 2);
        assert_eq!(st.query(g, m(15)), 3);
        assert_eq!(st.query(g, m(20)), 4);
    }

    #[test]
    fn nested_definition_rejected() {
        let mut st = GraphStore::new();
        st.begin(-1).unwrap();
        assert!(st.begin(-1).is_err());
        st.add_constant(m(0), 1, -1).unwrap();
        st.end(-1).unwrap();
        assert!(st.end(-1).is_err());
        assert!(st.add_constant(m(0), 1, -1).is_err());
    }
}
