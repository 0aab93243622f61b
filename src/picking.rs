//! GPU id-buffer picking.
//!
//! On click the scene re-renders every pickable draw into an offscreen
//! R32Uint texture via the pick pipelines, the texture is copied into a
//! mappable buffer and the pixel under the cursor is read back. Id 0 means
//! nothing was hit, reserved high ids mark helper geometry (ground plane,
//! axis indicator) whose picks leave the current selection alone.

use std::iter;

use winit::dpi::PhysicalPosition;

use crate::model::{AXIS_PICK_ID, GROUND_PICK_ID};
use crate::pipelines::pick::PICK_FORMAT;
use crate::texture::Texture;

/// What a raw pick id means for the selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PickOutcome {
    /// Background: clear the selection.
    Miss,
    /// A model element: select it.
    Mesh(u32),
    /// Ground plane or axis indicator: keep the selection as it is.
    Helper(u32),
}

/// Map a raw id from the pick buffer to a selection outcome.
pub fn classify_pick(id: u32) -> PickOutcome {
    match id {
        0 => PickOutcome::Miss,
        GROUND_PICK_ID | AXIS_PICK_ID => PickOutcome::Helper(id),
        id => PickOutcome::Mesh(id),
    }
}

/// Copy rows must be 256-byte aligned; padding the texture itself up to a
/// 256-pixel multiple keeps the copy trivial. Returns the padded size and
/// the cursor scale factors.
pub fn padded_pick_size(width: u32, height: u32) -> ([u32; 2], [f64; 2]) {
    let width = width.max(1);
    let height = height.max(1);
    let pad_w = (256 - width % 256) % 256;
    let pad_h = (256 - height % 256) % 256;
    let padded = [width + pad_w, height + pad_h];
    let factors = [
        f64::from(padded[0]) / f64::from(width),
        f64::from(padded[1]) / f64::from(height),
    ];
    (padded, factors)
}

/// Render the pick pass and read the id under `coords`. `encode` receives
/// the open render pass and issues every pickable draw.
pub async fn pick_at(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    surface_size: [u32; 2],
    coords: PhysicalPosition<f64>,
    encode: impl FnOnce(&mut wgpu::RenderPass<'_>),
) -> u32 {
    let ([width, height], [width_factor, height_factor]) =
        padded_pick_size(surface_size[0], surface_size[1]);
    let extent = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };

    let pick_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("pick_texture"),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: PICK_FORMAT,
        usage: wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let depth_texture = Texture::create_depth_texture(
        device,
        [width, height],
        1,
        false,
        "pick_depth_texture",
    );

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("pick_encoder"),
    });
    {
        let view = pick_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("pick_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &depth_texture.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        encode(&mut render_pass);
    }

    let u32_size = std::mem::size_of::<u32>() as u32;
    let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("pick_readback"),
        size: wgpu::BufferAddress::from(u32_size * width * height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            aspect: wgpu::TextureAspect::All,
            texture: &pick_texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &output_buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(u32_size * width),
                rows_per_image: Some(height),
            },
        },
        extent,
    );

    queue.submit(iter::once(encoder.finish()));

    // map THEN poll, otherwise the callback never fires
    let buffer_slice = output_buffer.slice(..);
    let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let poll = device.poll(wgpu::PollType::Wait);
    if poll.is_err() {
        log::error!("device poll failed during pick readback");
        return 0;
    }
    match rx.receive().await {
        Some(Ok(())) => {}
        _ => {
            log::error!("pick readback mapping failed");
            return 0;
        }
    }

    let id = {
        let data = buffer_slice.get_mapped_range();
        let x = ((coords.x * width_factor) as usize).min(width as usize - 1);
        let y = ((coords.y * height_factor) as usize).min(height as usize - 1);
        let index = (y * width as usize + x) * u32_size as usize;
        u32::from_le_bytes([data[index], data[index + 1], data[index + 2], data[index + 3]])
    };
    output_buffer.unmap();
    pick_texture.destroy();
    depth_texture.texture.destroy();

    log::debug!("pick at ({:.0}, {:.0}) resolved to id {id}", coords.x, coords.y);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_clears_and_reserved_ids_keep_the_selection() {
        assert_eq!(classify_pick(0), PickOutcome::Miss);
        assert_eq!(classify_pick(GROUND_PICK_ID), PickOutcome::Helper(GROUND_PICK_ID));
        assert_eq!(classify_pick(AXIS_PICK_ID), PickOutcome::Helper(AXIS_PICK_ID));
        assert_eq!(classify_pick(1), PickOutcome::Mesh(1));
        assert_eq!(classify_pick(4096), PickOutcome::Mesh(4096));
    }

    #[test]
    fn padded_size_is_a_256_multiple_covering_the_surface() {
        for (w, h) in [(1280, 720), (1920, 1080), (256, 256), (1, 1), (257, 255)] {
            let ([pw, ph], [fw, fh]) = padded_pick_size(w, h);
            assert_eq!(pw % 256, 0);
            assert_eq!(ph % 256, 0);
            assert!(pw >= w && ph >= h);
            assert!((fw - f64::from(pw) / f64::from(w)).abs() < 1e-12);
            assert!((fh - f64::from(ph) / f64::from(h)).abs() < 1e-12);
        }
    }

    #[test]
    fn already_aligned_sizes_are_not_padded() {
        let ([pw, ph], [fw, fh]) = padded_pick_size(512, 768);
        assert_eq!([pw, ph], [512, 768]);
        assert_eq!([fw, fh], [1.0, 1.0]);
    }
}
