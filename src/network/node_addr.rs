use std::fmt::{Debug, Display, Formatter};

/// The address of a node in the network. Addresses are opaque to the protocol: they are
///  compared for equality, used as keys in the per-peer tables, and serialized as a `u32` in
///  network byte order.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeAddr(pub u32);

impl NodeAddr {
    pub const SERIALIZED_LEN: usize = size_of::<u32>();

    pub fn to_raw(&self) -> u32 {
        self.0
    }
}

impl From<u32> for NodeAddr {
    fn from(value: u32) -> Self {
        NodeAddr(value)
    }
}

impl Debug for NodeAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[node {}]", self.0)
    }
}

impl Display for NodeAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    #[rstest]
    #[case::zero(0, "[node 0]", "0")]
    #[case::regular(134, "[node 134]", "134")]
    #[case::max(u32::MAX, "[node 4294967295]", "4294967295")]
    fn test_formatting(#[case] raw: u32, #[case] expected_debug: &str, #[case] expected_display: &str) {
        let addr = NodeAddr::from(raw);
        assert_eq!(format!("{:?}", addr), expected_debug);
        assert_eq!(format!("{}", addr), expected_display);
        assert_eq!(addr.to_raw(), raw);
    }

    #[test]
    fn test_display_honors_width() {
        assert_eq!(format!("{:>6}|{:<4}|", NodeAddr(42), NodeAddr(7)), "    42|7   |");
    }
}
