//! Portable fragment reconstruction kernels.
//!
//! A fragment is one 8x8 block of a plane, addressed by its byte offset into
//! the plane buffer. All kernels write 8 rows of 8 pixels starting at the
//! destination offset, stepping by `stride`.

/// Residue for one fragment, row-major.
pub type Residue = [i16; 64];

#[inline]
fn clamp255(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Reconstruct an intra fragment: residue around mid-gray.
pub fn frag_recon_intra(dst: &mut [u8], dst_off: usize, stride: usize, residue: &Residue) {
    for y in 0..8 {
        let row = &mut dst[dst_off + y * stride..dst_off + y * stride + 8];
        for (x, px) in row.iter_mut().enumerate() {
            *px = clamp255(residue[y * 8 + x] as i32 + 128);
        }
    }
}

/// Reconstruct an inter fragment from one predictor.
pub fn frag_recon_inter(
    dst: &mut [u8],
    dst_off: usize,
    src: &[u8],
    src_off: usize,
    stride: usize,
    residue: &Residue,
) {
    for y in 0..8 {
        let s = &src[src_off + y * stride..src_off + y * stride + 8];
        let d = &mut dst[dst_off + y * stride..dst_off + y * stride + 8];
        for x in 0..8 {
            d[x] = clamp255(s[x] as i32 + residue[y * 8 + x] as i32);
        }
    }
}

/// Reconstruct an inter fragment from the average of two predictors.
///
/// Used for half-pel motion vectors, where the prediction straddles two
/// full-pel positions.
pub fn frag_recon_inter2(
    dst: &mut [u8],
    dst_off: usize,
    src: &[u8],
    src_off1: usize,
    src_off2: usize,
    stride: usize,
    residue: &Residue,
) {
    for y in 0..8 {
        for x in 0..8 {
            let a = src[src_off1 + y * stride + x] as i32;
            let b = src[src_off2 + y * stride + x] as i32;
            dst[dst_off + y * stride + x] = clamp255(((a + b) >> 1) + residue[y * 8 + x] as i32);
        }
    }
}

/// Copy a list of fragments unchanged from `src` to `dst`.
pub fn frag_copy_list(dst: &mut [u8], src: &[u8], offsets: &[usize], stride: usize) {
    for &off in offsets {
        for y in 0..8 {
            let start = off + y * stride;
            dst[start..start + 8].copy_from_slice(&src[start..start + 8]);
        }
    }
}

/// Bounding function of the loop filter.
#[inline]
fn lflim(r: i32, limit: i32) -> i32 {
    if r <= -2 * limit || r >= 2 * limit {
        0
    } else if r <= -limit {
        -r - 2 * limit
    } else if r >= limit {
        -r + 2 * limit
    } else {
        r
    }
}

/// Filter 8 pixel quadruples `p[i], p[i+step], p[i+2step], p[i+3step]`.
fn filter_edge(plane: &mut [u8], first: usize, step: usize, advance: usize, limit: i32) {
    for i in 0..8 {
        let base = first + i * advance;
        let p0 = plane[base] as i32;
        let p1 = plane[base + step] as i32;
        let p2 = plane[base + 2 * step] as i32;
        let p3 = plane[base + 3 * step] as i32;
        let f = lflim((p0 - 3 * p1 + 3 * p2 - p3 + 4) >> 3, limit);
        plane[base + step] = clamp255(p1 + f);
        plane[base + 2 * step] = clamp255(p2 - f);
    }
}

/// Apply the loop filter to the block edges touching coded fragments.
///
/// `coded` has one entry per fragment in raster order over a plane of
/// `nhfrags` x `nvfrags` fragments.
pub fn loop_filter_plane(
    plane: &mut [u8],
    stride: usize,
    nhfrags: usize,
    nvfrags: usize,
    coded: &[bool],
    limit: u8,
) {
    if limit == 0 {
        return;
    }
    let limit = limit as i32;
    for fy in 0..nvfrags {
        for fx in 0..nhfrags {
            let fragi = fy * nhfrags + fx;
            if !coded[fragi] {
                continue;
            }
            let off = fy * 8 * stride + fx * 8;
            // Left edge
            if fx > 0 {
                filter_edge(plane, off - 2, 1, stride, limit);
            }
            // Top edge
            if fy > 0 {
                filter_edge(plane, off - 2 * stride, stride, 1, limit);
            }
            // Right edge, when the neighbour will not filter it
            if fx + 1 < nhfrags && !coded[fragi + 1] {
                filter_edge(plane, off + 6, 1, stride, limit);
            }
            // Bottom edge, likewise
            if fy + 1 < nvfrags && !coded[fragi + nhfrags] {
                filter_edge(plane, off + 6 * stride, stride, 1, limit);
            }
        }
    }
}
