//! Frame differencing over the downsampled camera buffer.

/// One downsampled RGBA frame (4 bytes per pixel, row-major), as returned by
/// `CanvasRenderingContext2d::get_image_data`.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self { width, height, rgba }
    }

    /// Uniformly filled frame, mostly useful for synthetic input.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..width * height {
            rgba.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
        Self { width, height, rgba }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        if i + 2 < self.rgba.len() {
            self.rgba[i..i + 3].copy_from_slice(&rgb);
        }
    }

    fn same_shape(&self, other: &Frame) -> bool {
        self.width == other.width && self.height == other.height && self.rgba.len() == other.rgba.len()
    }
}

/// Boolean motion grid, one cell per frame pixel. Lives for a single tick.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionMask {
    width: u32,
    height: u32,
    cells: Vec<bool>,
}

impl MotionMask {
    /// A mask with no motion anywhere (first frame, size change).
    pub fn still(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![false; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return false;
        }
        self.cells[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, motion: bool) {
        if x < self.width && y < self.height {
            self.cells[y as usize * self.width as usize + x as usize] = motion;
        }
    }

    pub fn motion_cells(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }

    /// Count motion cells within `radius` of (cx, cy), inclusive of the rim.
    pub fn count_in_circle(&self, cx: f64, cy: f64, radius: f64) -> usize {
        if radius < 0.0 {
            return 0;
        }
        let r2 = radius * radius;
        let x0 = (cx - radius).floor() as i64;
        let x1 = (cx + radius).ceil() as i64;
        let y0 = (cy - radius).floor() as i64;
        let y1 = (cy + radius).ceil() as i64;
        let mut count = 0;
        for y in y0..=y1 {
            for x in x0..=x1 {
                let dx = x as f64 - cx;
                let dy = y as f64 - cy;
                if dx * dx + dy * dy <= r2 && self.get(x, y) {
                    count += 1;
                }
            }
        }
        count
    }
}

/// Per-pixel RGB delta test. Alpha is ignored.
pub fn diff(previous: &Frame, current: &Frame, threshold: u16) -> MotionMask {
    let mut mask = MotionMask::still(current.width, current.height);
    if !previous.same_shape(current) {
        return mask;
    }
    for (i, (p, c)) in previous
        .rgba
        .chunks_exact(4)
        .zip(current.rgba.chunks_exact(4))
        .enumerate()
    {
        let delta: u16 = (0..3).map(|k| (p[k] as i16 - c[k] as i16).unsigned_abs()).sum();
        mask.cells[i] = delta > threshold;
    }
    mask
}

/// Holds the previous frame between ticks and turns each new frame into a mask.
#[derive(Debug, Default)]
pub struct FrameDiffer {
    previous: Option<Frame>,
}

impl FrameDiffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` when there is nothing to compare against yet; the frame
    /// is kept either way. A resolution change also restarts the comparison.
    pub fn push(&mut self, frame: Frame, threshold: u16) -> Option<MotionMask> {
        let mask = match &self.previous {
            Some(prev) if prev.same_shape(&frame) => Some(diff(prev, &frame, threshold)),
            _ => None,
        };
        self.previous = Some(frame);
        mask
    }

    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_frames_have_no_motion() {
        let a = Frame::filled(10, 8, [40, 90, 200]);
        let mask = diff(&a, &a.clone(), 25);
        assert_eq!(mask.motion_cells(), 0);
        assert_eq!((mask.width(), mask.height()), (10, 8));
    }

    #[test]
    fn threshold_boundary_is_strict() {
        let prev = Frame::filled(3, 1, [100, 100, 100]);
        let mut cur = prev.clone();
        cur.set_pixel(0, 0, [110, 110, 105]); // 25: not motion
        cur.set_pixel(1, 0, [110, 110, 106]); // 26: motion
        cur.set_pixel(2, 0, [74, 100, 100]); // 26 via a negative delta
        let mask = diff(&prev, &cur, 25);
        assert!(!mask.get(0, 0));
        assert!(mask.get(1, 0));
        assert!(mask.get(2, 0));
    }

    #[test]
    fn alpha_changes_are_ignored() {
        let prev = Frame::filled(1, 1, [0, 0, 0]);
        let mut cur = prev.clone();
        cur.rgba[3] = 0;
        assert_eq!(diff(&prev, &cur, 25).motion_cells(), 0);
    }

    #[test]
    fn first_frame_yields_no_mask() {
        let mut differ = FrameDiffer::new();
        assert!(differ.push(Frame::filled(4, 4, [0, 0, 0]), 25).is_none());
        assert!(differ.has_previous());
        let mask = differ.push(Frame::filled(4, 4, [255, 255, 255]), 25).unwrap();
        assert_eq!(mask.motion_cells(), 16);
    }

    #[test]
    fn resolution_change_restarts_comparison() {
        let mut differ = FrameDiffer::new();
        differ.push(Frame::filled(4, 4, [0, 0, 0]), 25);
        assert!(differ.push(Frame::filled(8, 6, [255, 0, 0]), 25).is_none());
        assert!(differ.push(Frame::filled(8, 6, [255, 0, 0]), 25).is_some());
    }

    #[test]
    fn circle_count_respects_radius_and_edges() {
        let mut mask = MotionMask::still(10, 10);
        for y in 0..10 {
            for x in 0..10 {
                mask.set(x, y, true);
            }
        }
        // radius 1 around an interior cell: centre plus 4 neighbours
        assert_eq!(mask.count_in_circle(5.0, 5.0, 1.0), 5);
        // corner clips to the grid
        assert_eq!(mask.count_in_circle(0.0, 0.0, 1.0), 3);
        assert_eq!(mask.count_in_circle(5.0, 5.0, -1.0), 0);
    }
}
