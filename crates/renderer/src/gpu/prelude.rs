//! GLSL declarations shared by every pass program.
//!
//! User shaders are plain GLSL 450 bodies. Before compilation the `#version`
//! line is stripped and [`prelude`] is prepended: it declares the uniform
//! block matching [`UniformLayout`], the audio and buffer textures at their
//! bind-group slots, and macros that expose everything under the names the
//! uniform table uses (`iTime`, `iSoundR`, one sampler per buffer name, ...).

use std::borrow::Cow;
use std::fmt::Write as _;

use wgpu::naga::ShaderStage;

use crate::uniforms::{SlotKind, UniformTable, ValueShape};

use super::pipeline::{AUDIO_BINDING_BASE, BUFFER_BINDING_BASE, SAMPLER_BINDING, UNIFORM_BINDING};
use super::uniforms::UniformLayout;

/// Source of one pass program.
#[derive(Debug, Clone)]
pub struct ProgramSource {
    pub vertex: String,
    pub fragment: String,
}

impl ProgramSource {
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }
}

pub(crate) fn compile_stage(
    device: &wgpu::Device,
    prelude: &str,
    source: &str,
    stage: ShaderStage,
    label: &str,
) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(wrap(prelude, source)),
            stage,
            defines: &[],
        },
    })
}

/// Declarations for a table/layout pair.
pub fn prelude(table: &UniformTable, layout: &UniformLayout) -> String {
    let mut out = String::from("#version 450\n\n");

    let _ = writeln!(
        out,
        "layout(std140, set = 0, binding = {UNIFORM_BINDING}) uniform PassUniforms {{"
    );
    for (slot, member) in layout.members() {
        let name = &table.slots()[slot].name;
        let _ = writeln!(out, "    {} _{name};", glsl_type(member.shape));
    }
    out.push_str("} pass;\n\n");
    for (slot, _) in layout.members() {
        let name = &table.slots()[slot].name;
        let _ = writeln!(out, "#define {name} pass._{name}");
    }

    let _ = writeln!(
        out,
        "\nlayout(set = 0, binding = {SAMPLER_BINDING}) uniform sampler pass_sampler;"
    );
    for slot in table.slots() {
        match slot.kind {
            SlotKind::AudioSampler(channel) => {
                let binding = AUDIO_BINDING_BASE + channel.unit();
                let name = &slot.name;
                let _ = writeln!(
                    out,
                    "layout(set = 0, binding = {binding}) uniform texture1D {name}_texture;\n\
                     #define {name} sampler1D({name}_texture, pass_sampler)"
                );
            }
            SlotKind::BufferSampler(index) => {
                let binding = BUFFER_BINDING_BASE + index as u32;
                let name = &slot.name;
                let _ = writeln!(
                    out,
                    "layout(set = 0, binding = {binding}) uniform texture2D {name}_texture;\n\
                     #define {name} sampler2D({name}_texture, pass_sampler)"
                );
            }
            _ => {}
        }
    }
    out
}

fn glsl_type(shape: ValueShape) -> &'static str {
    match shape {
        ValueShape::Int => "int",
        ValueShape::Float => "float",
        ValueShape::Vec2 => "vec2",
        ValueShape::Vec3 => "vec3",
        ValueShape::Vec4 => "vec4",
    }
}

fn wrap(prelude: &str, source: &str) -> String {
    let mut body = String::with_capacity(source.len());
    let mut skipped_version = false;
    for line in source.lines() {
        if !skipped_version && line.trim_start().starts_with("#version") {
            skipped_version = true;
            continue;
        }
        body.push_str(line);
        body.push('\n');
    }
    format!("{prelude}\n#line 1\n{body}")
}
