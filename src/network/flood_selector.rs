use tracing::{trace, warn};
use crate::network::link::{LinkHint, LinkId, LinkSet};

/// The policy for choosing the links a packet is sent on
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum FloodStrategy {
    /// Every packet goes out on every link, including the link it arrived on
    Naive,
    /// Packets go out on every link except the one they arrived on. Explicit links (i.e. ACKs
    ///  going back the way the DATA packet came) are honored.
    Directional,
    /// Like [FloodStrategy::Directional], but packets for a destination are sent only on the
    ///  link on which the lowest-hop packet from that destination was seen, once that is known.
    #[default]
    Learned,
}

pub struct FloodSelector {
    strategy: FloodStrategy,
    link_count: u16,
}

impl FloodSelector {
    pub fn new(strategy: FloodStrategy, link_count: u16) -> FloodSelector {
        FloodSelector {
            strategy,
            link_count,
        }
    }

    pub fn strategy(&self) -> FloodStrategy {
        self.strategy
    }

    pub fn link_count(&self) -> u16 {
        self.link_count
    }

    fn is_valid(&self, link: LinkId) -> bool {
        link.number() <= self.link_count
    }

    /// The returned set never contains a link outside `1..=link_count`, and it never contains
    ///  `avoid_link` unless the strategy is [FloodStrategy::Naive]. It is empty only if there is
    ///  no link apart from `avoid_link`.
    pub fn select_links(&self, explicit_link: Option<LinkId>, avoid_link: Option<LinkId>, hint: LinkHint) -> LinkSet {
        let result = self.do_select_links(explicit_link, avoid_link, hint);
        trace!("selected links {:?} (explicit: {:?}, avoid: {:?}, hint: {:?})", result, explicit_link, avoid_link, hint);
        result
    }

    fn do_select_links(&self, explicit_link: Option<LinkId>, avoid_link: Option<LinkId>, hint: LinkHint) -> LinkSet {
        if self.strategy == FloodStrategy::Naive {
            return LinkSet::all(self.link_count);
        }

        match explicit_link {
            Some(link) if self.is_valid(link) => return LinkSet::single(link),
            Some(link) => warn!("explicit {:?} is outside the node's {} links - ignoring it", link, self.link_count),
            None => {}
        }

        if self.strategy == FloodStrategy::Learned {
            if let LinkHint::Only(link) = hint {
                if self.is_valid(link) && Some(link) != avoid_link {
                    return LinkSet::single(link);
                }
            }
        }

        let mut result = LinkSet::all(self.link_count);
        if let Some(avoid) = avoid_link {
            result.remove(avoid);
        }
        result
    }
}
