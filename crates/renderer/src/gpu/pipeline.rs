use crate::audio::AudioChannel;

/// Per-pass uniform block.
pub const UNIFORM_BINDING: u32 = 0;
/// The single linear sampler shared by every texture.
pub const SAMPLER_BINDING: u32 = 1;
/// Audio textures occupy four bindings starting here, in unit order.
pub const AUDIO_BINDING_BASE: u32 = 2;
/// Buffer `k`'s sampler binding is `BUFFER_BINDING_BASE + k`.
pub const BUFFER_BINDING_BASE: u32 = AUDIO_BINDING_BASE + AudioChannel::ALL.len() as u32;

pub(crate) const BUFFER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
pub(crate) const AUDIO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

pub(crate) fn bind_group_layout(
    device: &wgpu::Device,
    num_buffers: usize,
) -> wgpu::BindGroupLayout {
    let mut entries = Vec::with_capacity(BUFFER_BINDING_BASE as usize + num_buffers);
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: UNIFORM_BINDING,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: SAMPLER_BINDING,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    });
    for channel in AudioChannel::ALL {
        entries.push(texture_entry(
            AUDIO_BINDING_BASE + channel.unit(),
            wgpu::TextureViewDimension::D1,
        ));
    }
    for index in 0..num_buffers {
        entries.push(texture_entry(
            BUFFER_BINDING_BASE + index as u32,
            wgpu::TextureViewDimension::D2,
        ));
    }

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("pass bind group layout"),
        entries: &entries,
    })
}

fn texture_entry(
    binding: u32,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

pub(crate) fn linear_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("pass sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

/// `src_alpha, one_minus_src_alpha` for color and alpha.
/// Whether a pipeline targeting `format` blends. Float buffer targets only
/// blend when the adapter supports it.
pub(crate) fn blend_enabled(
    requested: bool,
    format: wgpu::TextureFormat,
    float32_blendable: bool,
) -> bool {
    requested && (format != BUFFER_FORMAT || float32_blendable)
}

fn alpha_blend() -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

/// Builds the point-list pipeline of one pass for a given target format.
pub(crate) fn build_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    vertex: &wgpu::ShaderModule,
    fragment: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    blend: bool,
    label: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some("main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::PointList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: blend.then(alpha_blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}
