//! CPU-side mirror of the per-pass uniform block.
//!
//! Value slots of the [`UniformTable`] are packed in slot order with std140
//! alignment; sampler slots and malformed user uniforms take no space. The
//! GLSL declaration produced by `prelude` walks the same layout, so the two
//! cannot disagree.

use crate::backend::UniformValue;
use crate::uniforms::{UniformTable, ValueShape};

/// Placement of one value slot inside the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    pub offset: u32,
    pub shape: ValueShape,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformLayout {
    members: Vec<Option<Member>>,
    size: u32,
}

impl UniformLayout {
    pub fn new(table: &UniformTable) -> Self {
        let mut members = Vec::with_capacity(table.len());
        let mut offset = 0;
        for slot in table.slots() {
            match slot.kind.value_shape() {
                Some(shape) => {
                    offset = align_to(offset, std140_align(shape));
                    members.push(Some(Member { offset, shape }));
                    offset += std140_size(shape);
                }
                None => members.push(None),
            }
        }
        Self {
            members,
            size: align_to(offset.max(16), 16),
        }
    }

    pub fn member(&self, slot: usize) -> Option<Member> {
        self.members.get(slot).copied().flatten()
    }

    /// Value members with their slot index, in block order.
    pub fn members(&self) -> impl Iterator<Item = (usize, Member)> + '_ {
        self.members
            .iter()
            .enumerate()
            .filter_map(|(slot, member)| member.map(|m| (slot, m)))
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

/// Bytes of one program's uniform block, written slot by slot and copied to
/// the GPU before each draw.
#[derive(Debug, Clone)]
pub struct UniformBlock {
    bytes: Vec<u8>,
}

impl UniformBlock {
    pub fn new(layout: &UniformLayout) -> Self {
        Self {
            bytes: vec![0; layout.size() as usize],
        }
    }

    /// Stores `value` at `member`. Values whose shape differs from the
    /// member's are ignored and `false` is returned.
    pub fn write(&mut self, member: Member, value: UniformValue) -> bool {
        let start = member.offset as usize;
        match (member.shape, value) {
            (ValueShape::Int, UniformValue::Int(v)) => self.put(start, bytemuck::bytes_of(&v)),
            (ValueShape::Float, UniformValue::Float(v)) => self.put(start, bytemuck::bytes_of(&v)),
            (ValueShape::Vec2, UniformValue::Vec2(v)) => self.put(start, bytemuck::cast_slice(&v)),
            (ValueShape::Vec3, UniformValue::Vec3(v)) => self.put(start, bytemuck::cast_slice(&v)),
            (ValueShape::Vec4, UniformValue::Vec4(v)) => self.put(start, bytemuck::cast_slice(&v)),
            _ => false,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn put(&mut self, start: usize, data: &[u8]) -> bool {
        match self.bytes.get_mut(start..start + data.len()) {
            Some(dst) => {
                dst.copy_from_slice(data);
                true
            }
            None => false,
        }
    }
}

fn std140_align(shape: ValueShape) -> u32 {
    match shape {
        ValueShape::Int | ValueShape::Float => 4,
        ValueShape::Vec2 => 8,
        ValueShape::Vec3 | ValueShape::Vec4 => 16,
    }
}

fn std140_size(shape: ValueShape) -> u32 {
    match shape {
        ValueShape::Int | ValueShape::Float => 4,
        ValueShape::Vec2 => 8,
        ValueShape::Vec3 => 12,
        ValueShape::Vec4 => 16,
    }
}

fn align_to(offset: u32, align: u32) -> u32 {
    offset.div_ceil(align) * align
}
