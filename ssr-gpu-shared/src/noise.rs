//! Fixed noise source tables for blue-noise generation.
//! Both tables hold 8-bit values widened to `u32` texels (R32_UINT).

/// Sobol table: 256 samples x 256 dimensions, texel `(dimension, sample)`.
pub const SOBOL_WIDTH: u32 = 256;
pub const SOBOL_HEIGHT: u32 = 256;

/// Scrambling tile: 8 dimensions for each pixel of a 128x128 tile, packed into 512x256 texels.
pub const SCRAMBLING_TILE_WIDTH: u32 = 128 * 4;
pub const SCRAMBLING_TILE_HEIGHT: u32 = 128 * 2;

/// Side of the generated blue-noise textures.
pub const BLUE_NOISE_SIZE: u32 = 128;

fn hash32(mut x: u32) -> u32 {
    x ^= x >> 16;
    x = x.wrapping_mul(0x7feb_352d);
    x ^= x >> 15;
    x = x.wrapping_mul(0x846c_a68b);
    x ^= x >> 16;
    x
}

/// Value of a single Sobol-style sequence entry in 8-bit precision.
fn sobol_value(sample: u32, dimension: u32) -> u32 {
    match dimension {
        // Van der Corput in base 2.
        0 => (sample as u8).reverse_bits() as u32,
        // Second Sobol dimension (primitive polynomial x + 1).
        1 => {
            let mut v = 0x80u32;
            let mut value = 0u32;
            for bit in 0..8 {
                if sample & (1 << bit) != 0 {
                    value ^= v;
                }
                v ^= v >> 1;
            }
            value & 0xFF
        }
        // Remaining dimensions are Owen-scrambled copies of the first two.
        d => {
            let base = sobol_value(sample, d & 1);
            (base ^ hash32(d.wrapping_mul(0x9e37_79b9))) & 0xFF
        }
    }
}

/// Builds the Sobol table, row-major with `dimension + sample * 256`.
pub fn sobol_256spp_256d() -> Vec<u32> {
    let mut table = Vec::with_capacity((SOBOL_WIDTH * SOBOL_HEIGHT) as usize);
    for sample in 0..SOBOL_HEIGHT {
        for dimension in 0..SOBOL_WIDTH {
            table.push(sobol_value(sample, dimension));
        }
    }
    table
}

/// Builds the scrambling tile, indexed by `(dimension % 8) + (i + j * 128) * 8`.
pub fn scrambling_tile() -> Vec<u32> {
    let len = (SCRAMBLING_TILE_WIDTH * SCRAMBLING_TILE_HEIGHT) as usize;
    (0..len as u32).map(|idx| hash32(idx ^ 0x5bd1_e995) & 0xFF).collect()
}

/// Reference evaluation of the blue-noise sampler for pixel `(i, j)`.
pub fn sample_blue_noise(
    sobol: &[u32],
    scrambling: &[u32],
    i: u32,
    j: u32,
    sample_index: u32,
    dimension: u32,
) -> f32 {
    let (i, j) = (i & 127, j & 127);
    let sample_index = sample_index & 255;
    let dimension = dimension & 255;
    let value = sobol[(dimension + sample_index * 256) as usize]
        ^ scrambling[((dimension % 8) + (i + j * 128) * 8) as usize];
    (0.5 + value as f32) / 256.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_have_texture_sizes_and_byte_range() {
        let sobol = sobol_256spp_256d();
        let scrambling = scrambling_tile();
        assert_eq!(sobol.len(), 256 * 256);
        assert_eq!(scrambling.len(), 512 * 256);
        assert!(sobol.iter().chain(scrambling.iter()).all(|&v| v < 256));
    }

    #[test]
    fn first_dimension_is_a_permutation() {
        let sobol = sobol_256spp_256d();
        let mut seen = [false; 256];
        for sample in 0..256 {
            seen[sobol[sample * 256] as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn samples_stay_inside_unit_interval() {
        let sobol = sobol_256spp_256d();
        let scrambling = scrambling_tile();
        for (i, j) in [(0, 0), (127, 127), (300, 5)] {
            let v = sample_blue_noise(&sobol, &scrambling, i, j, 3, 1);
            assert!(v > 0.0 && v < 1.0);
        }
    }
}
