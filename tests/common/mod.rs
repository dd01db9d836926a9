use mockup_creator::{Channels, Image};

/// RGB image whose pixels cycle through black, mid-gray and white,
/// the three values soft light leaves untouched when blended with themselves.
pub fn stepped_rgb(width: u32, height: u32) -> Image {
    let levels = [0u8, 128, 255];
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let i = (x / 4 + y / 4) as usize;
            data.extend_from_slice(&[levels[i % 3], levels[(i + 1) % 3], levels[(i + 2) % 3]]);
        }
    }
    Image::new(width, height, Channels::Rgb, data).unwrap()
}

/// Smooth RGB gradient with no flat regions.
pub fn gradient_rgb(width: u32, height: u32) -> Image {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            data.push((x * 255 / (width - 1).max(1)) as u8);
            data.push((y * 255 / (height - 1).max(1)) as u8);
            data.push(((x + y) % 256) as u8);
        }
    }
    Image::new(width, height, Channels::Rgb, data).unwrap()
}

/// Gray mask covering the centre quarter of the frame.
pub fn centre_mask(width: u32, height: u32) -> Image {
    let mut data = vec![0u8; (width * height) as usize];
    for y in height / 4..height * 3 / 4 {
        for x in width / 4..width * 3 / 4 {
            data[(y * width + x) as usize] = 255;
        }
    }
    Image::new(width, height, Channels::Gray, data).unwrap()
}
