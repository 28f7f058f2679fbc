//! Topology snapshot rendering.
//!
//! Purely diagnostic: consumes owned snapshots and writes PNGs into the
//! artifacts directory. Never called on the protocol path; render errors
//! are reported, not propagated into the daemon.

use crate::topology::TopologySnapshot;
use plotters::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

const CANVAS: (u32, u32) = (800, 800);
const NODE_RADIUS: i32 = 12;

#[derive(Debug, Error)]
pub enum VizError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("render: {0}")]
    Render(String),
}

/// Node placement on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VizStyle {
    /// Nodes on a circle, sorted by name. Stable across renders.
    Circular,
    /// Nodes on a square grid, row-major by name.
    Grid,
}

impl VizStyle {
    /// Parse a configured mode; unknown values warn and fall back, like
    /// an unknown draw mode should not kill a running node.
    pub fn parse(mode: Option<&str>) -> Self {
        match mode {
            None | Some("circular") => VizStyle::Circular,
            Some("grid") => VizStyle::Grid,
            Some(other) => {
                warn!(mode = other, "unknown visualize mode, falling back to circular");
                VizStyle::Circular
            }
        }
    }
}

pub struct Visualizer {
    dir: PathBuf,
    style: VizStyle,
    self_name: String,
}

impl Visualizer {
    pub fn new(dir: PathBuf, style: VizStyle, self_name: String) -> Result<Self, VizError> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            style,
            self_name,
        })
    }

    /// Render the current topology. With a postfix, writes
    /// `<self>-<postfix>.png` and refreshes `<self>.png` to match;
    /// without, only the base file.
    pub fn render_snapshot(
        &self,
        snap: &TopologySnapshot,
        postfix: Option<u64>,
    ) -> Result<PathBuf, VizError> {
        let base = self.dir.join(format!("{}.png", self.self_name));
        let target = match postfix {
            Some(n) => self.dir.join(format!("{}-{}.png", self.self_name, n)),
            None => base.clone(),
        };
        self.draw(&target, snap, None)?;
        if target != base {
            std::fs::copy(&target, &base)?;
        }
        Ok(target)
    }

    /// Render the realized route of a delivered message as
    /// `<src>-><dst>.png` with the traversed edges highlighted.
    pub fn render_route(
        &self,
        snap: &TopologySnapshot,
        route: &[String],
    ) -> Result<PathBuf, VizError> {
        let (Some(src), Some(dst)) = (route.first(), route.last()) else {
            return Err(VizError::Render("empty route".to_string()));
        };
        let target = self.dir.join(format!("{src}->{dst}.png"));
        self.draw(&target, snap, Some(route))?;
        Ok(target)
    }

    fn draw(
        &self,
        target: &Path,
        snap: &TopologySnapshot,
        route: Option<&[String]>,
    ) -> Result<(), VizError> {
        let root = BitMapBackend::new(target, CANVAS).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;
        let positions = self.layout(snap);

        let route_edges: Vec<(String, String)> = route
            .map(|r| {
                r.windows(2)
                    .map(|pair| normalize(&pair[0], &pair[1]))
                    .collect()
            })
            .unwrap_or_default();

        for (a, b) in &snap.edges {
            let (Some(&pa), Some(&pb)) = (positions.get(a), positions.get(b)) else {
                continue;
            };
            let traversed = route_edges.contains(&normalize(a, b));
            let style = if traversed {
                RED.stroke_width(3)
            } else {
                BLUE.stroke_width(1)
            };
            root.draw(&PathElement::new(vec![pa, pb], style))
                .map_err(render_err)?;
        }

        for (name, info) in &snap.nodes {
            let Some(&pos) = positions.get(name) else {
                continue;
            };
            let color = if info.local_mpr {
                RED
            } else if info.mpr {
                GREEN
            } else {
                BLUE
            };
            root.draw(&Circle::new(pos, NODE_RADIUS, color.filled()))
                .map_err(render_err)?;
            root.draw(&Text::new(
                name.clone(),
                (pos.0 + NODE_RADIUS + 2, pos.1 - NODE_RADIUS),
                ("sans-serif", 16).into_font().color(&BLACK),
            ))
            .map_err(render_err)?;
        }

        root.present().map_err(render_err)
    }

    fn layout(&self, snap: &TopologySnapshot) -> HashMap<String, (i32, i32)> {
        let n = snap.nodes.len().max(1);
        let (w, h) = (CANVAS.0 as i32, CANVAS.1 as i32);
        match self.style {
            VizStyle::Circular => {
                let (cx, cy) = (w / 2, h / 2);
                let radius = (w.min(h) / 2 - 80) as f64;
                snap.nodes
                    .iter()
                    .enumerate()
                    .map(|(i, (name, _))| {
                        let angle = std::f64::consts::TAU * i as f64 / n as f64;
                        let x = cx + (radius * angle.cos()) as i32;
                        let y = cy + (radius * angle.sin()) as i32;
                        (name.clone(), (x, y))
                    })
                    .collect()
            }
            VizStyle::Grid => {
                let cols = (n as f64).sqrt().ceil() as usize;
                let rows = n.div_ceil(cols);
                let cell_w = w / cols as i32;
                let cell_h = h / rows as i32;
                snap.nodes
                    .iter()
                    .enumerate()
                    .map(|(i, (name, _))| {
                        let col = (i % cols) as i32;
                        let row = (i / cols) as i32;
                        (
                            name.clone(),
                            (col * cell_w + cell_w / 2, row * cell_h + cell_h / 2),
                        )
                    })
                    .collect()
            }
        }
    }
}

fn normalize(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

fn render_err<E: std::fmt::Display>(e: E) -> VizError {
    VizError::Render(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_parse_fallback() {
        assert_eq!(VizStyle::parse(None), VizStyle::Circular);
        assert_eq!(VizStyle::parse(Some("circular")), VizStyle::Circular);
        assert_eq!(VizStyle::parse(Some("grid")), VizStyle::Grid);
        assert_eq!(VizStyle::parse(Some("spectral")), VizStyle::Circular);
    }

    #[test]
    fn test_layout_is_deterministic() {
        use crate::topology::TopologyDb;
        let mut db = TopologyDb::new();
        db.add_edge("a", "b");
        db.add_edge("b", "c");
        let snap = db.snapshot();
        let viz = Visualizer {
            dir: PathBuf::from("."),
            style: VizStyle::Circular,
            self_name: "a".to_string(),
        };
        assert_eq!(viz.layout(&snap), viz.layout(&snap));
        assert_eq!(viz.layout(&snap).len(), 3);
    }
}
