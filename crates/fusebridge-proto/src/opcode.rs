use fusebridge_types::Opcode;

/// Operation tags understood by stock daemons.
///
/// The bridge forwards whatever opcode it is given; these exist so callers
/// and daemons agree on names.
pub mod opcodes {
    use fusebridge_types::Opcode;

    pub const LOOKUP: Opcode = Opcode(1);
    pub const FORGET: Opcode = Opcode(2);
    pub const GETATTR: Opcode = Opcode(3);
    pub const SETATTR: Opcode = Opcode(4);
    pub const READLINK: Opcode = Opcode(5);
    pub const SYMLINK: Opcode = Opcode(6);
    pub const GETDIR: Opcode = Opcode(7);
    pub const MKNOD: Opcode = Opcode(8);
    pub const MKDIR: Opcode = Opcode(9);
    pub const UNLINK: Opcode = Opcode(10);
    pub const RMDIR: Opcode = Opcode(11);
    pub const RENAME: Opcode = Opcode(12);
    pub const LINK: Opcode = Opcode(13);
    pub const OPEN: Opcode = Opcode(14);
    pub const READ: Opcode = Opcode(15);
    pub const WRITE: Opcode = Opcode(16);
}

pub fn name(opcode: Opcode) -> &'static str {
    match opcode {
        opcodes::LOOKUP => "LOOKUP",
        opcodes::FORGET => "FORGET",
        opcodes::GETATTR => "GETATTR",
        opcodes::SETATTR => "SETATTR",
        opcodes::READLINK => "READLINK",
        opcodes::SYMLINK => "SYMLINK",
        opcodes::GETDIR => "GETDIR",
        opcodes::MKNOD => "MKNOD",
        opcodes::MKDIR => "MKDIR",
        opcodes::UNLINK => "UNLINK",
        opcodes::RMDIR => "RMDIR",
        opcodes::RENAME => "RENAME",
        opcodes::LINK => "LINK",
        opcodes::OPEN => "OPEN",
        opcodes::READ => "READ",
        opcodes::WRITE => "WRITE",
        _ => "UNKNOWN",
    }
}
