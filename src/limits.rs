/// Longest accepted location name ("Kitchen", "Washroom", ...).
pub const MAX_RESOURCE_LEN: usize = 64;

/// Longest accepted owner / user id.
pub const MAX_OWNER_LEN: usize = 128;

/// Longest accepted block id as assigned by a repository.
pub const MAX_BLOCK_ID_LEN: usize = 128;

/// Most blocks a single (location, day) schedule may hold.
pub const MAX_BLOCKS_PER_SCHEDULE: usize = 1_440;

/// Most locations a configuration may list.
pub const MAX_LOCATIONS: usize = 32;
