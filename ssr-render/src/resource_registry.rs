//! Dense table of named GPU resources owned by an effect.

use std::fmt::Debug;
use std::marker::PhantomData;

use crate::error::{PostFxError, PostFxResult};
use crate::graphics::{Buffer, Texture, TextureView};

/// Dense identifier of a registry slot.
pub trait SlotId: Copy + Debug {
    const COUNT: usize;

    fn index(self) -> usize;
}

/// Resource held by a registry slot.
#[derive(Clone, Debug)]
pub enum Resource {
    Texture(Texture),
    Buffer(Buffer),
}

impl From<Texture> for Resource {
    fn from(texture: Texture) -> Self {
        Self::Texture(texture)
    }
}

impl From<Buffer> for Resource {
    fn from(buffer: Buffer) -> Self {
        Self::Buffer(buffer)
    }
}

/// Slot table indexed by `Id`. Inserting into an occupied slot replaces the occupant.
#[derive(Debug)]
pub struct ResourceRegistry<Id: SlotId> {
    slots: Vec<Option<Resource>>,
    _id: PhantomData<Id>,
}

impl<Id: SlotId> Default for ResourceRegistry<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: SlotId> ResourceRegistry<Id> {
    pub fn new() -> Self {
        Self {
            slots: vec![None; Id::COUNT],
            _id: PhantomData,
        }
    }

    /// Stores `resource` in `id` and returns the previous occupant.
    pub fn insert(&mut self, id: Id, resource: impl Into<Resource>) -> Option<Resource> {
        self.slots[id.index()].replace(resource.into())
    }

    pub fn remove(&mut self, id: Id) -> Option<Resource> {
        self.slots[id.index()].take()
    }

    pub fn get(&self, id: Id) -> Option<&Resource> {
        self.slots[id.index()].as_ref()
    }

    pub fn contains(&self, id: Id) -> bool {
        self.slots[id.index()].is_some()
    }

    pub fn texture(&self, id: Id) -> Option<&Texture> {
        match self.get(id) {
            Some(Resource::Texture(texture)) => Some(texture),
            _ => None,
        }
    }

    pub fn buffer(&self, id: Id) -> Option<&Buffer> {
        match self.get(id) {
            Some(Resource::Buffer(buffer)) => Some(buffer),
            _ => None,
        }
    }

    pub fn require_texture(&self, id: Id) -> PostFxResult<&Texture> {
        self.texture(id)
            .ok_or_else(|| PostFxError::MissingResource(format!("{id:?}")))
    }

    pub fn require_buffer(&self, id: Id) -> PostFxResult<&Buffer> {
        self.buffer(id)
            .ok_or_else(|| PostFxError::MissingResource(format!("{id:?}")))
    }

    /// Default shader resource view of the texture in `id`.
    pub fn texture_srv(&self, id: Id) -> PostFxResult<TextureView> {
        Ok(self.require_texture(id)?.default_srv()?)
    }

    pub fn texture_rtv(&self, id: Id) -> PostFxResult<TextureView> {
        Ok(self.require_texture(id)?.default_rtv()?)
    }

    pub fn texture_dsv(&self, id: Id) -> PostFxResult<TextureView> {
        Ok(self.require_texture(id)?.default_dsv()?)
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
