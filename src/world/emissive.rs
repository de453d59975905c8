//! Block colour and emission table.
//!
//! Light sources are identified by terrain id, tinted by dye and, for
//! flora, scaled by growth stage. The table is the single source of
//! truth for both the packed RGB output of the dense convolution and
//! the per-channel seeds of the flood-fill queue.

use glam::{vec3, Vec3};

use crate::world::terrain::TerrainId;

/// Maximum light intensity.
pub const MAX_INTENSITY: u8 = 15;

/// An RGB colour (0..255 per component) with a light intensity
/// (0..[`MAX_INTENSITY`]).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Colour {
    pub rgb: Vec3,
    pub intensity: f32,
}

impl Colour {
    pub fn new(r: f32, g: f32, b: f32, intensity: f32) -> Self {
        Self {
            rgb: vec3(r, g, b),
            intensity,
        }
    }

    /// Pack as `(r, g, b, intensity)` bytes, high to low.
    pub fn pack(&self) -> u32 {
        let rgb = self.rgb.clamp(Vec3::ZERO, Vec3::splat(255.0));
        ((rgb.x as u32) << 24)
            | ((rgb.y as u32) << 16)
            | ((rgb.z as u32) << 8)
            | (self.intensity.clamp(0.0, 255.0) as u32)
    }

    pub fn unpack(x: u32) -> Self {
        Self {
            rgb: vec3(
                ((x >> 24) & 0xff) as f32,
                ((x >> 16) & 0xff) as f32,
                ((x >> 8) & 0xff) as f32,
            ),
            intensity: (x & 0xff) as f32,
        }
    }
}

/// Growth stage 0 means fully grown; stages 1..=5 ramp from dark to
/// full brightness.
fn scaled_growth_intensity(max_intensity: f32, growth: u8) -> f32 {
    let scale = if growth == 0 {
        1.0
    } else {
        (growth - 1) as f32 / 4.0
    };
    max_intensity * scale
}

fn led_colour(dye: u8) -> Vec3 {
    match dye {
        // none
        0 => vec3(255.0, 255.0, 255.0),
        // blue
        1 => vec3(44.0, 116.0, 255.0),
        // red
        2 => vec3(255.0, 80.0, 80.0),
        // green
        3 => vec3(80.0, 255.0, 80.0),
        // orange
        4 => vec3(255.0, 128.0, 32.0),
        // white
        5 => vec3(255.0, 255.0, 255.0),
        // purple
        6 => vec3(128.0, 80.0, 255.0),
        // pink
        7 => vec3(255.0, 96.0, 207.0),
        // yellow
        8 => vec3(255.0, 232.0, 23.0),
        // black
        9 => vec3(160.0, 16.0, 255.0),
        // tan
        10 => vec3(255.0, 209.0, 143.0),
        // brown
        11 => vec3(121.0, 55.0, 14.0),
        // silver
        12 => vec3(127.0, 136.0, 151.0),
        // cyan
        13 => vec3(21.0, 255.0, 245.0),
        // magenta
        14 => vec3(252.0, 15.0, 255.0),
        // brightgreen
        15 => vec3(189.0, 255.0, 177.0),
        // brightred
        16 => vec3(255.0, 157.0, 157.0),
        // brightpurple
        17 => vec3(223.0, 187.0, 255.0),
        // brightpink
        18 => vec3(255.0, 220.0, 236.0),
        // brightyellow
        19 => vec3(255.0, 254.0, 217.0),
        // brightblue
        20 => vec3(150.0, 183.0, 255.0),
        // brightorange
        21 => vec3(255.0, 197.0, 142.0),
        // lightblue
        22 => vec3(176.0, 228.0, 255.0),
        _ => vec3(255.0, 255.0, 255.0),
    }
}

/// Colour and emission strength of a block.
///
/// Non-emissive blocks return intensity 0 with a white tint.
pub fn emissiveness(id: TerrainId, dye: u8, growth: u8) -> Colour {
    let max = MAX_INTENSITY as f32;
    match id {
        // led
        64 => Colour {
            rgb: led_colour(dye),
            intensity: max,
        },
        // emberstone
        65 => Colour::new(255.0, 96.0, 80.0, max),
        // sunstone
        66 => Colour::new(255.0, 192.0, 48.0, max),
        // moonstone
        67 => Colour::new(240.0, 240.0, 255.0, max),
        // flare
        16777231 => Colour::new(255.0, 255.0, 255.0, max),
        // ultraviolet
        16777261 => Colour::new(153.0, 50.0, 204.0, scaled_growth_intensity(max, growth)),
        // fire flower
        16777263 => Colour::new(255.0, 0.0, 40.0, scaled_growth_intensity(max, growth)),
        // marigold
        16777264 => Colour::new(255.0, 165.0, 0.0, scaled_growth_intensity(max, growth)),
        // morning glory
        16777265 => Colour::new(130.0, 200.0, 255.0, scaled_growth_intensity(max, growth)),
        // peony
        16777266 => Colour::new(255.0, 90.0, 170.0, scaled_growth_intensity(max, growth)),
        // sunflower
        16777267 => Colour::new(255.0, 255.0, 0.0, scaled_growth_intensity(max, growth)),
        _ => Colour::new(255.0, 255.0, 255.0, 0.0),
    }
}

/// Per-channel 0..15 seed values for the flood-fill queue: the colour
/// scaled by its intensity. The fourth byte is unused by the queue.
pub fn emissive_channels(id: TerrainId, dye: u8, growth: u8) -> [u8; 4] {
    let colour = emissiveness(id, dye, growth);
    let scale = |c: f32| (c * colour.intensity / 255.0).round() as u8;
    [
        scale(colour.rgb.x),
        scale(colour.rgb.y),
        scale(colour.rgb.z),
        0,
    ]
}

/// Whether the terrain id ever emits light.
pub fn is_emissive(id: TerrainId) -> bool {
    emissiveness(id, 0, 0).intensity > 0.0
}
