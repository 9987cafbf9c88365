use serde::Deserialize;

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Deserialize)]
pub struct PageSize(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub size: PageSize,
    pub offset: u32,
}

impl PageRequest {
    pub fn first(size: PageSize) -> Self {
        Self { size, offset: 0 }
    }
}
