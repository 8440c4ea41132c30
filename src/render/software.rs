use crate::foundation::core::{NormalizedViewport, Rgba8};
use crate::foundation::error::{ExportError, ExportResult};
use crate::foundation::math::lerp_u8;
use crate::presentation::PostprocessProps;
use crate::render::backend::{Renderer, SceneFrame};
use crate::render::scene::{Camera, SceneState};

const RING_ATOMS: usize = 8;
const ATOM_RADIUS: f64 = 0.45;
const CENTER_RADIUS: f64 = 0.6;
const OUTLINE_COLOR: [u8; 3] = [16, 16, 16];

const PALETTE: [[u8; 3]; 4] = [
    [144, 144, 144], // carbon
    [48, 80, 248],   // nitrogen
    [255, 13, 13],   // oxygen
    [255, 200, 50],  // sulfur
];

/// Options for [`SoftwareRenderer`].
#[derive(Clone, Debug)]
pub struct SoftwareRendererOpts {
    /// Post-processing defaults reported to the export pipeline.
    pub postprocess_defaults: PostprocessProps,
}

impl Default for SoftwareRendererOpts {
    fn default() -> Self {
        Self {
            postprocess_defaults: PostprocessProps::new()
                .with("occlusion", false)
                .with("occlusion_strength", 0.5)
                .with("outline", false)
                .with("outline_width", 1.5),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct ProjectedAtom {
    x: f64,
    y: f64,
    radius: f64,
    depth: f64,
    color: [u8; 3],
}

#[derive(Clone, Debug)]
struct DrawState {
    scene: SceneState,
    background: Rgba8,
    transparent: bool,
    occlusion: Option<f64>,
    outline: Option<f64>,
}

/// Deterministic CPU renderer drawing a small ball-and-stick style "molecule" (a ring of atoms
/// around a central atom).
///
/// Meant for previews, the command line tool and tests; a production viewer plugs its own
/// [`Renderer`] into the [`RenderContext`](crate::render::RenderContext).
#[derive(Debug, Default)]
pub struct SoftwareRenderer {
    opts: SoftwareRendererOpts,
    state: Option<DrawState>,
    draws: u64,
}

impl SoftwareRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_opts(opts: SoftwareRendererOpts) -> Self {
        Self {
            opts,
            state: None,
            draws: 0,
        }
    }

    /// Number of completed draws.
    pub fn draw_count(&self) -> u64 {
        self.draws
    }
}

impl Renderer for SoftwareRenderer {
    fn postprocess_defaults(&self) -> PostprocessProps {
        self.opts.postprocess_defaults.clone()
    }

    fn draw(&mut self, frame: &SceneFrame<'_>) -> ExportResult<()> {
        let post = &frame.presentation.postprocessing;
        let occlusion = post
            .get_bool("occlusion")
            .unwrap_or(false)
            .then(|| post.get_f64("occlusion_strength").unwrap_or(0.5).clamp(0.0, 1.0));
        let outline = post
            .get_bool("outline")
            .unwrap_or(false)
            .then(|| post.get_f64("outline_width").unwrap_or(1.5).max(0.0));

        self.state = Some(DrawState {
            scene: frame.scene.clone(),
            background: frame.presentation.background,
            transparent: frame.presentation.transparent_background,
            occlusion,
            outline,
        });
        self.draws += 1;
        Ok(())
    }

    fn read_pixels(
        &mut self,
        width: u32,
        height: u32,
        viewport: NormalizedViewport,
    ) -> ExportResult<Vec<u8>> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| ExportError::render("read_pixels called before any draw"))?;
        viewport.rect().validate_within(width, height)?;

        let atoms = project_atoms(&state.scene, width, height);
        let bg = if state.transparent {
            [0, 0, 0, 0]
        } else {
            state.background.to_array()
        };

        let vp = viewport.rect();
        let mut out = vec![0u8; vp.width as usize * vp.height as usize * 4];
        for (row, line) in out.chunks_exact_mut(vp.width as usize * 4).enumerate() {
            let py = f64::from(vp.y) + row as f64 + 0.5;
            for (col, px) in line.chunks_exact_mut(4).enumerate() {
                let pxf = f64::from(vp.x) + col as f64 + 0.5;
                px.copy_from_slice(&shade_pixel(&atoms, state, pxf, py).unwrap_or(bg));
            }
        }
        Ok(out)
    }
}

fn atom_positions(scene: &SceneState) -> Vec<([f64; 3], f64, [u8; 3])> {
    // The ring radius follows the model index so trajectory playback is visible.
    let ring = 1.6 + 0.15 * (scene.model_index % 4) as f64;
    let mut atoms = Vec::with_capacity(RING_ATOMS + 1);
    atoms.push(([0.0, 0.0, 0.0], CENTER_RADIUS, PALETTE[3]));
    for i in 0..RING_ATOMS {
        let a = std::f64::consts::TAU * i as f64 / RING_ATOMS as f64;
        let y = if i % 2 == 0 { 0.25 } else { -0.25 };
        atoms.push((
            [ring * a.cos(), y, ring * a.sin()],
            ATOM_RADIUS,
            PALETTE[i % 3],
        ));
    }
    atoms
}

fn project_atoms(scene: &SceneState, width: u32, height: u32) -> Vec<ProjectedAtom> {
    let Camera {
        yaw_deg,
        pitch_deg,
        distance,
    } = scene.camera;
    let (sy, cy) = yaw_deg.to_radians().sin_cos();
    let (sp, cp) = pitch_deg.to_radians().sin_cos();
    let focal = f64::from(width.min(height)) * 0.9;
    let (cx, cyc) = (f64::from(width) / 2.0, f64::from(height) / 2.0);

    let mut out = atom_positions(scene)
        .into_iter()
        .filter_map(|([x, y, z], r, color)| {
            // yaw around y, then pitch around x
            let x1 = cy * x + sy * z;
            let z1 = -sy * x + cy * z;
            let y2 = cp * y - sp * z1;
            let z2 = sp * y + cp * z1;
            let depth = distance + z2;
            if depth <= 1e-3 {
                return None;
            }
            Some(ProjectedAtom {
                x: cx + focal * x1 / depth,
                y: cyc - focal * y2 / depth,
                radius: focal * r / depth,
                depth,
                color,
            })
        })
        .collect::<Vec<_>>();
    // Nearest first so the first hit while shading is the visible one.
    out.sort_by(|a, b| a.depth.total_cmp(&b.depth));
    out
}

fn shade_pixel(atoms: &[ProjectedAtom], state: &DrawState, x: f64, y: f64) -> Option<[u8; 4]> {
    let atom = atoms.iter().find(|a| {
        let (dx, dy) = (x - a.x, y - a.y);
        dx * dx + dy * dy <= a.radius * a.radius
    })?;

    let (dx, dy) = ((x - atom.x) / atom.radius, (y - atom.y) / atom.radius);
    let rr = (dx * dx + dy * dy).min(1.0);
    let nz = (1.0 - rr).sqrt();

    if let Some(width) = state.outline {
        let dist_to_edge = atom.radius * (1.0 - rr.sqrt());
        if dist_to_edge <= width {
            return Some([OUTLINE_COLOR[0], OUTLINE_COLOR[1], OUTLINE_COLOR[2], 255]);
        }
    }

    // Light from the upper left, in front of the scene.
    let (lx, ly, lz) = (-0.4, -0.5, 0.77);
    let lambert = (dx * lx + dy * ly + nz * lz).max(0.0);
    let mut intensity = 0.25 + 0.75 * lambert;
    if let Some(strength) = state.occlusion {
        intensity *= 1.0 - strength * (1.0 - nz);
    }

    let c = atom.color;
    Some([
        lerp_u8(0, c[0], intensity),
        lerp_u8(0, c[1], intensity),
        lerp_u8(0, c[2], intensity),
        255,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::Viewport;
    use crate::presentation::PresentationState;

    fn draw(r: &mut SoftwareRenderer, scene: &SceneState, presentation: &PresentationState) {
        r.draw(&SceneFrame {
            time_ms: 0.0,
            scene,
            presentation,
        })
        .unwrap();
    }

    fn presentation(r: &SoftwareRenderer) -> PresentationState {
        PresentationState::new(Rgba8::opaque(10, 20, 30), r.postprocess_defaults())
    }

    #[test]
    fn read_before_draw_is_an_error() {
        let mut r = SoftwareRenderer::new();
        let err = r
            .read_pixels(8, 8, Viewport::full(8, 8).normalized())
            .unwrap_err();
        assert!(matches!(err, ExportError::Render(_)));
    }

    #[test]
    fn corners_show_background_and_center_shows_atom() {
        let mut r = SoftwareRenderer::new();
        let p = presentation(&r);
        draw(&mut r, &SceneState::default(), &p);
        let px = r.read_pixels(64, 64, Viewport::full(64, 64).normalized()).unwrap();
        assert_eq!(&px[0..4], &[10, 20, 30, 255]);

        let center = (32 * 64 + 32) * 4;
        assert_eq!(px[center + 3], 255);
        assert_ne!(&px[center..center + 3], &[10, 20, 30]);
    }

    #[test]
    fn transparent_background_clears_alpha() {
        let mut r = SoftwareRenderer::new();
        let mut p = presentation(&r);
        p.transparent_background = true;
        draw(&mut r, &SceneState::default(), &p);
        let px = r.read_pixels(32, 32, Viewport::full(32, 32).normalized()).unwrap();
        assert_eq!(&px[0..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn viewport_crop_matches_full_frame() {
        let mut r = SoftwareRenderer::new();
        let p = presentation(&r);
        draw(&mut r, &SceneState::default(), &p);
        let full = r.read_pixels(40, 40, Viewport::full(40, 40).normalized()).unwrap();
        let crop = r
            .read_pixels(40, 40, Viewport::new(10, 12, 8, 6).normalized())
            .unwrap();
        for row in 0..6usize {
            let src = ((12 + row) * 40 + 10) * 4;
            assert_eq!(&crop[row * 32..(row + 1) * 32], &full[src..src + 32]);
        }
    }

    #[test]
    fn camera_changes_the_image() {
        let mut r = SoftwareRenderer::new();
        let p = presentation(&r);
        let vp = Viewport::full(48, 48).normalized();

        let mut scene = SceneState::default();
        draw(&mut r, &scene, &p);
        let a = r.read_pixels(48, 48, vp).unwrap();

        scene.camera.yaw_deg = 20.0;
        draw(&mut r, &scene, &p);
        let b = r.read_pixels(48, 48, vp).unwrap();
        assert_ne!(a, b);
        assert_eq!(r.draw_count(), 2);
    }

    #[test]
    fn outline_pass_darkens_rims() {
        let mut r = SoftwareRenderer::new();
        let mut p = presentation(&r);
        let vp = Viewport::full(64, 64).normalized();
        draw(&mut r, &SceneState::default(), &p);
        let plain = r.read_pixels(64, 64, vp).unwrap();

        p.postprocessing.insert("outline", true);
        draw(&mut r, &SceneState::default(), &p);
        let outlined = r.read_pixels(64, 64, vp).unwrap();

        let dark = |px: &[u8]| {
            px.chunks_exact(4)
                .filter(|c| c[..3] == OUTLINE_COLOR)
                .count()
        };
        assert!(dark(&outlined) > dark(&plain));
    }

    #[test]
    fn out_of_bounds_viewport_is_rejected() {
        let mut r = SoftwareRenderer::new();
        let p = presentation(&r);
        draw(&mut r, &SceneState::default(), &p);
        assert!(
            r.read_pixels(16, 16, Viewport::new(10, 0, 8, 8).normalized())
                .is_err()
        );
    }
}
