//! wgpu renderer
//!
//! Draws `SceneFrame`s into an offscreen color target that persists between
//! frames, so a capture reads back exactly what was last drawn. The window
//! layer blits that target onto its surface with `present_to`.
//!
//! GPU copies of meshes, materials and the backdrop are rebuilt whenever the
//! frame revision changes. Color maps survive revisions: an image is uploaded
//! once and dropped when no frame samples it any more. Model matrices and
//! lights are written every frame.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;

use bytemuck::Zeroable;
use glam::Mat4;
use image::imageops::FilterType;
use image::RgbaImage;
use log::debug;
use wgpu::util::DeviceExt;

use crate::config::hex_to_rgb;
use crate::error::RenderError;
use crate::lighting::LightingRig;
use crate::material::{ColorSpace, MaterialBindings, MaterialDescriptor, SurfaceRole, Texture};
use crate::mesh::{MeshData, Vertex};
use crate::render::{DrawInstance, Renderer, SceneFrame};
use crate::scene::Background;

/// Format of the offscreen drawing surface and of exported pixels
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Per-frame camera and light data (group 0)
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct GlobalsUniform {
    view_proj: [[f32; 4]; 4],
    camera_position: [f32; 4],
    ambient: [f32; 4],
    light_directions: [[f32; 4]; 3],
    light_colors: [[f32; 4]; 3],
    /// xyz toward the shadow caster, w = receiver plane y
    shadow_direction: [f32; 4],
    /// x = opacity, y = half plane size, z = fade radius
    shadow_params: [f32; 4],
}

impl GlobalsUniform {
    fn from_frame(frame: &SceneFrame<'_>) -> Self {
        let rig: &LightingRig = frame.lighting;
        let lights = rig.directional();
        let ambient = rig.ambient.radiance();
        let plane = frame.shadow_plane;

        // No caster means an opacity of zero; the shadow pass is skipped too
        let (shadow_direction, opacity, radius) = match rig.shadow_caster() {
            Some(light) => {
                let radius = light.shadow.map_or(0.0, |s| s.radius);
                (light.direction(), plane.opacity, radius)
            }
            None => (glam::Vec3::Y, 0.0, 0.0),
        };

        Self {
            view_proj: frame.view_proj.to_cols_array_2d(),
            camera_position: frame.camera_position.extend(1.0).to_array(),
            ambient: ambient.extend(1.0).to_array(),
            light_directions: lights.map(|l| l.direction().extend(0.0).to_array()),
            light_colors: lights.map(|l| l.radiance().extend(1.0).to_array()),
            shadow_direction: shadow_direction.extend(plane.y).to_array(),
            shadow_params: [opacity, plane.size / 2.0, radius, 0.0],
        }
    }
}

/// Model uniform buffer data for per-instance transforms (group 1)
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ModelUniform {
    model: [[f32; 4]; 4],
}

impl ModelUniform {
    fn from_matrix(model: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
        }
    }
}

/// Material factors (group 2, binding 0)
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct MaterialUniform {
    base_color: [f32; 4],
    /// x = roughness, y = metalness, z = has color map
    params: [f32; 4],
}

impl MaterialUniform {
    fn from_descriptor(material: &MaterialDescriptor) -> Self {
        let (r, g, b) = hex_to_rgb(material.base_color);
        Self {
            base_color: [srgb_to_linear(r), srgb_to_linear(g), srgb_to_linear(b), 1.0],
            params: [
                material.roughness,
                material.metalness,
                if material.texture.is_some() { 1.0 } else { 0.0 },
                0.0,
            ],
        }
    }
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// GPU mesh handle
struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    num_indices: u32,
}

impl GpuMesh {
    fn from_mesh_data(device: &wgpu::Device, data: &MeshData) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Book Vertex Buffer"),
            contents: bytemuck::cast_slice(&data.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Book Index Buffer"),
            contents: bytemuck::cast_slice(&data.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            vertex_buffer,
            index_buffer,
            num_indices: data.indices.len() as u32,
        }
    }
}

/// Uploaded image plus the view bind groups sample from
struct GpuTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl GpuTexture {
    fn from_image(device: &wgpu::Device, queue: &wgpu::Queue, image: &RgbaImage, format: wgpu::TextureFormat) -> Self {
        let limit = device.limits().max_texture_dimension_2d;
        let resized;
        let image = if image.width() > limit || image.height() > limit {
            let scale = limit as f32 / image.width().max(image.height()) as f32;
            let width = ((image.width() as f32 * scale) as u32).max(1);
            let height = ((image.height() as f32 * scale) as u32).max(1);
            debug!("Downscaling {}x{} texture to {}x{}", image.width(), image.height(), width, height);
            resized = image::imageops::resize(image, width, height, FilterType::Triangle);
            &resized
        } else {
            image
        };

        let size = wgpu::Extent3d {
            width: image.width(),
            height: image.height(),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Color Map"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.as_raw(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * image.width()),
                rows_per_image: Some(image.height()),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            _texture: texture,
            view,
        }
    }

    fn from_texture(device: &wgpu::Device, queue: &wgpu::Queue, texture: &Texture) -> Self {
        let format = match texture.color_space {
            ColorSpace::Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            ColorSpace::Linear => wgpu::TextureFormat::Rgba8Unorm,
        };
        Self::from_image(device, queue, &texture.image, format)
    }
}

/// Offscreen color and depth attachments
struct RenderTarget {
    size: (u32, u32),
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
}

impl RenderTarget {
    fn new(device: &wgpu::Device, (width, height): (u32, u32)) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Drawing Surface"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        Self {
            size: (width, height),
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            color,
        }
    }
}

/// One draw instance as it lives on the GPU
struct GpuInstance {
    mesh: GpuMesh,
    model_buffer: wgpu::Buffer,
    model_bind_group: wgpu::BindGroup,
    /// Index range and material bind group slot per role group
    groups: Vec<(Range<u32>, usize)>,
    casts_shadow: bool,
}

/// Everything uploaded for one scene revision
struct UploadedScene {
    revision: u64,
    instances: Vec<GpuInstance>,
    materials: Vec<wgpu::BindGroup>,
    background: Option<wgpu::BindGroup>,
}

/// Decoded images are shared by `Arc`, so the pointer identifies the pixels
type TextureKey = (usize, ColorSpace);

fn texture_key(texture: &Texture) -> TextureKey {
    (Arc::as_ptr(&texture.image) as usize, texture.color_space)
}

/// Every color map a frame samples: role materials first, then the backdrop
fn frame_textures<'a>(frame: &SceneFrame<'a>) -> Vec<&'a Texture> {
    let materials = frame.instances.iter().flat_map(|instance| {
        let DrawInstance { mesh, materials, .. } = *instance;
        mesh.groups
            .iter()
            .filter_map(move |group| materials.get(group.role).texture.as_ref())
    });
    let background = match frame.background {
        Background::Image(texture) => Some(texture),
        Background::Transparent | Background::Solid(_) => None,
    };
    materials.chain(background).collect()
}

/// An uploaded color map. Holding the image keeps its address from being reused
/// by another allocation while the key is live.
struct CachedTexture {
    _image: Arc<RgbaImage>,
    gpu: GpuTexture,
}

/// Renderer that draws through wgpu into an offscreen texture
pub struct GpuRenderer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    scene_pipeline: wgpu::RenderPipeline,
    shadow_pipeline: wgpu::RenderPipeline,
    background_pipeline: wgpu::RenderPipeline,
    present_pipeline: Option<wgpu::RenderPipeline>,
    globals_buffer: wgpu::Buffer,
    globals_bind_group: wgpu::BindGroup,
    model_layout: wgpu::BindGroupLayout,
    material_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    white: GpuTexture,
    target: Option<RenderTarget>,
    uploaded: Option<UploadedScene>,
    textures: HashMap<TextureKey, CachedTexture>,
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entries(first_binding: u32) -> [wgpu::BindGroupLayoutEntry; 2] {
    [
        wgpu::BindGroupLayoutEntry {
            binding: first_binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2,
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: first_binding + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        },
    ]
}

fn primitive_state(cull_mode: Option<wgpu::Face>) -> wgpu::PrimitiveState {
    wgpu::PrimitiveState {
        topology: wgpu::PrimitiveTopology::TriangleList,
        strip_index_format: None,
        front_face: wgpu::FrontFace::Ccw,
        cull_mode,
        polygon_mode: wgpu::PolygonMode::Fill,
        unclipped_depth: false,
        conservative: false,
    }
}

fn depth_state(write: bool, compare: wgpu::CompareFunction) -> Option<wgpu::DepthStencilState> {
    Some(wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: write,
        depth_compare: compare,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    })
}

impl GpuRenderer {
    /// Create a renderer on an existing device. `present_format` enables
    /// `present_to` for surfaces of that format.
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        present_format: Option<wgpu::TextureFormat>,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Book Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });
        let blit_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Blit Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("blit.wgsl").into()),
        });

        let globals_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Globals Buffer"),
            contents: bytemuck::cast_slice(&[GlobalsUniform::zeroed()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        // Camera and lights (group 0)
        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[uniform_entry(
                0,
                wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            )],
            label: Some("globals_bind_group_layout"),
        });
        let globals_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &globals_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buffer.as_entire_binding(),
            }],
            label: Some("globals_bind_group"),
        });

        // Per-instance transform (group 1)
        let model_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX)],
            label: Some("model_bind_group_layout"),
        });

        // Material factors and color map (group 2)
        let [map_entry, sampler_entry] = texture_entries(1);
        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::FRAGMENT),
                map_entry,
                sampler_entry,
            ],
            label: Some("material_bind_group_layout"),
        });

        // Fullscreen source texture
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &texture_entries(0),
            label: Some("texture_bind_group_layout"),
        });

        let scene_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&globals_layout, &model_layout, &material_layout],
            push_constant_ranges: &[],
        });
        let shadow_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Shadow Pipeline Layout"),
            bind_group_layouts: &[&globals_layout, &model_layout],
            push_constant_ranges: &[],
        });
        let blit_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blit Pipeline Layout"),
            bind_group_layouts: &[&texture_layout],
            push_constant_ranges: &[],
        });

        let alpha_target = |format| {
            [Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })]
        };
        let multisample = wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        };

        let scene_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Scene Pipeline"),
            layout: Some(&scene_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[Vertex::desc()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &alpha_target(COLOR_FORMAT),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: primitive_state(Some(wgpu::Face::Back)),
            depth_stencil: depth_state(true, wgpu::CompareFunction::Less),
            multisample,
            multiview: None,
            cache: None,
        });

        // Depth write with a strict test keeps overlapping shadow triangles
        // from darkening the same pixel twice
        let shadow_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Shadow Pipeline"),
            layout: Some(&shadow_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_shadow",
                buffers: &[Vertex::desc()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_shadow",
                targets: &alpha_target(COLOR_FORMAT),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: primitive_state(None),
            depth_stencil: depth_state(true, wgpu::CompareFunction::Less),
            multisample,
            multiview: None,
            cache: None,
        });

        let background_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Background Pipeline"),
            layout: Some(&blit_layout),
            vertex: wgpu::VertexState {
                module: &blit_shader,
                entry_point: "vs_fullscreen",
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &blit_shader,
                entry_point: "fs_blit",
                targets: &alpha_target(COLOR_FORMAT),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: primitive_state(None),
            depth_stencil: depth_state(false, wgpu::CompareFunction::Always),
            multisample,
            multiview: None,
            cache: None,
        });

        let present_pipeline = present_format.map(|format| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Present Pipeline"),
                layout: Some(&blit_layout),
                vertex: wgpu::VertexState {
                    module: &blit_shader,
                    entry_point: "vs_fullscreen",
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &blit_shader,
                    entry_point: "fs_blit",
                    targets: &alpha_target(format),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: primitive_state(None),
                depth_stencil: None,
                multisample,
                multiview: None,
                cache: None,
            })
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Color Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let white = GpuTexture::from_image(
            &device,
            &queue,
            &RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255])),
            wgpu::TextureFormat::Rgba8UnormSrgb,
        );

        Self {
            device,
            queue,
            scene_pipeline,
            shadow_pipeline,
            background_pipeline,
            present_pipeline,
            globals_buffer,
            globals_bind_group,
            model_layout,
            material_layout,
            texture_layout,
            sampler,
            white,
            target: None,
            uploaded: None,
            textures: HashMap::new(),
        }
    }

    fn texture_bind_group(&self, view: &wgpu::TextureView, label: &str) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
            label: Some(label),
        })
    }

    fn material_bind_group(&self, material: &MaterialDescriptor, view: &wgpu::TextureView) -> wgpu::BindGroup {
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Material Buffer"),
            contents: bytemuck::cast_slice(&[MaterialUniform::from_descriptor(material)]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.material_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
            label: Some("material_bind_group"),
        })
    }

    /// Upload the color maps the frame samples for the first time and release
    /// the ones it no longer does
    fn sync_textures(&mut self, frame: &SceneFrame<'_>) {
        let mut live = HashSet::new();
        let mut uploaded = 0;
        for texture in frame_textures(frame) {
            let key = texture_key(texture);
            live.insert(key);
            if !self.textures.contains_key(&key) {
                let gpu = GpuTexture::from_texture(&self.device, &self.queue, texture);
                self.textures.insert(
                    key,
                    CachedTexture {
                        _image: Arc::clone(&texture.image),
                        gpu,
                    },
                );
                uploaded += 1;
            }
        }
        let before = self.textures.len();
        self.textures.retain(|key, _| live.contains(key));
        if uploaded > 0 || before != self.textures.len() {
            debug!(
                "Texture cache: {} uploaded, {} released, {} live",
                uploaded,
                before - self.textures.len(),
                self.textures.len()
            );
        }
    }

    fn texture_view(&self, texture: &Texture) -> &wgpu::TextureView {
        self.textures
            .get(&texture_key(texture))
            .map_or(&self.white.view, |cached| &cached.gpu.view)
    }

    /// Rebuild the frame's meshes, material bind groups and backdrop over the
    /// cached color maps
    fn upload(&self, frame: &SceneFrame<'_>) -> UploadedScene {
        let mut materials: Vec<wgpu::BindGroup> = Vec::new();
        let mut material_slots: HashMap<(usize, SurfaceRole), usize> = HashMap::new();

        let mut instances = Vec::with_capacity(frame.instances.len());
        for instance in &frame.instances {
            let bindings: &MaterialBindings = instance.materials;
            let bindings_key = bindings as *const MaterialBindings as usize;

            let mut groups = Vec::with_capacity(instance.mesh.groups.len());
            for group in &instance.mesh.groups {
                let slot = match material_slots.get(&(bindings_key, group.role)) {
                    Some(&slot) => slot,
                    None => {
                        let material = bindings.get(group.role);
                        let view = match &material.texture {
                            Some(texture) => self.texture_view(texture),
                            None => &self.white.view,
                        };
                        let bind_group = self.material_bind_group(material, view);
                        materials.push(bind_group);
                        material_slots.insert((bindings_key, group.role), materials.len() - 1);
                        materials.len() - 1
                    }
                };
                groups.push((group.indices.clone(), slot));
            }

            let model_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Model Buffer"),
                contents: bytemuck::cast_slice(&[ModelUniform::from_matrix(instance.model)]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
            let model_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &self.model_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: model_buffer.as_entire_binding(),
                }],
                label: Some("model_bind_group"),
            });

            instances.push(GpuInstance {
                mesh: GpuMesh::from_mesh_data(&self.device, instance.mesh),
                model_buffer,
                model_bind_group,
                groups,
                casts_shadow: instance.casts_shadow,
            });
        }

        let background = match frame.background {
            Background::Image(texture) => {
                Some(self.texture_bind_group(self.texture_view(texture), "background_bind_group"))
            }
            Background::Transparent | Background::Solid(_) => None,
        };

        debug!(
            "Uploaded revision {}: {} instance(s), {} material(s), {} texture(s)",
            frame.revision,
            instances.len(),
            materials.len(),
            self.textures.len()
        );

        UploadedScene {
            revision: frame.revision,
            instances,
            materials,
            background,
        }
    }

    /// Draw the drawing surface onto a window surface view
    pub fn present_to(&self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView, clear: wgpu::Color) {
        let (Some(pipeline), Some(target)) = (&self.present_pipeline, &self.target) else {
            return;
        };
        let bind_group = self.texture_bind_group(&target.color_view, "present_bind_group");

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Present Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, &bind_group, &[]);
        render_pass.draw(0..3, 0..1);
    }
}

fn clear_color(background: &Background) -> wgpu::Color {
    match background {
        Background::Solid(color) => {
            let (r, g, b) = hex_to_rgb(*color);
            wgpu::Color {
                r: srgb_to_linear(r) as f64,
                g: srgb_to_linear(g) as f64,
                b: srgb_to_linear(b) as f64,
                a: 1.0,
            }
        }
        Background::Transparent | Background::Image(_) => wgpu::Color::TRANSPARENT,
    }
}

impl Renderer for GpuRenderer {
    fn render(&mut self, frame: &SceneFrame<'_>) -> Result<(), RenderError> {
        let size = (frame.viewport.0.max(1), frame.viewport.1.max(1));
        if self.target.as_ref().map(|t| t.size) != Some(size) {
            debug!("Drawing surface resized to {}x{}", size.0, size.1);
            self.target = Some(RenderTarget::new(&self.device, size));
        }
        if self.uploaded.as_ref().map(|u| u.revision) != Some(frame.revision) {
            self.sync_textures(frame);
            self.uploaded = Some(self.upload(frame));
        }
        let (Some(target), Some(uploaded)) = (&self.target, &self.uploaded) else {
            return Err(RenderError::EmptySurface);
        };

        self.queue.write_buffer(
            &self.globals_buffer,
            0,
            bytemuck::cast_slice(&[GlobalsUniform::from_frame(frame)]),
        );
        for (gpu, instance) in uploaded.instances.iter().zip(&frame.instances) {
            self.queue.write_buffer(
                &gpu.model_buffer,
                0,
                bytemuck::cast_slice(&[ModelUniform::from_matrix(instance.model)]),
            );
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Scene Encoder"),
        });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear_color(frame.background)),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let Some(background) = &uploaded.background {
                render_pass.set_pipeline(&self.background_pipeline);
                render_pass.set_bind_group(0, background, &[]);
                render_pass.draw(0..3, 0..1);
            }

            render_pass.set_pipeline(&self.scene_pipeline);
            render_pass.set_bind_group(0, &self.globals_bind_group, &[]);
            for instance in &uploaded.instances {
                render_pass.set_bind_group(1, &instance.model_bind_group, &[]);
                render_pass.set_vertex_buffer(0, instance.mesh.vertex_buffer.slice(..));
                render_pass.set_index_buffer(instance.mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                for (indices, material) in &instance.groups {
                    render_pass.set_bind_group(2, &uploaded.materials[*material], &[]);
                    render_pass.draw_indexed(indices.clone(), 0, 0..1);
                }
            }

            if frame.lighting.shadow_caster().is_some() {
                render_pass.set_pipeline(&self.shadow_pipeline);
                render_pass.set_bind_group(0, &self.globals_bind_group, &[]);
                for instance in uploaded.instances.iter().filter(|i| i.casts_shadow) {
                    render_pass.set_bind_group(1, &instance.model_bind_group, &[]);
                    render_pass.set_vertex_buffer(0, instance.mesh.vertex_buffer.slice(..));
                    render_pass.set_index_buffer(instance.mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                    render_pass.draw_indexed(0..instance.mesh.num_indices, 0, 0..1);
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn read_pixels(&mut self) -> Result<RgbaImage, RenderError> {
        let target = self.target.as_ref().ok_or(RenderError::EmptySurface)?;
        let (width, height) = target.size;

        let unpadded_bytes_per_row = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded_bytes_per_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &target.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = readback.slice(..);
        let (sender, receiver) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| RenderError::Readback(e.to_string()))?
            .map_err(|e| RenderError::Readback(e.to_string()))?;

        let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * height) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(padded_bytes_per_row as usize) {
                pixels.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
            }
        }
        readback.unmap();

        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| RenderError::Readback("pixel buffer size mismatch".into()))
    }
}
