strong_type!(ConnectionId, u64);
strong_type!(Unique, u32);
strong_type!(NodeId, u64);
strong_type!(Opcode, u32);
strong_type!(Uid, u32);
strong_type!(Gid, u32);
strong_type!(Pid, u32);

impl Unique {
    /// Zero is never handed out by a connection.
    pub const NONE: Unique = Unique(0);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

/// Identity of the task that issued a request.
///
/// Carried verbatim in the inbound header; the bridge never interprets it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RequestContext {
    pub uid: Uid,
    pub gid: Gid,
    pub pid: Pid,
}

impl RequestContext {
    pub fn new(uid: u32, gid: u32, pid: u32) -> Self {
        Self {
            uid: Uid(uid),
            gid: Gid(gid),
            pid: Pid(pid),
        }
    }

    /// Context used for requests the bridge issues on its own behalf.
    pub fn root() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_none() {
        assert!(Unique::NONE.is_none());
        assert!(!Unique(7).is_none());
        assert_eq!(format!("{:?}", Unique(7)), "Unique(7)");
    }

    #[test]
    fn test_connection_id_order() {
        assert!(ConnectionId(1) < ConnectionId(2));
    }

    #[test]
    fn test_request_context_new() {
        let ctx = RequestContext::new(1000, 100, 4242);
        assert_eq!(*ctx.uid, 1000);
        assert_eq!(*ctx.gid, 100);
        assert_eq!(*ctx.pid, 4242);
        assert_eq!(RequestContext::root(), RequestContext::new(0, 0, 0));
    }

    #[test]
    fn test_request_context_serde() {
        let ctx = RequestContext::new(1, 2, 3);
        let json = serde_json::to_string(&ctx).unwrap();
        assert_eq!(json, r#"{"uid":1,"gid":2,"pid":3}"#);
        let parsed: RequestContext = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ctx);
    }
}
