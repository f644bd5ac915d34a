//! Static claim tables: which card justifies an action or block, and who is
//! entitled to block what.

use crate::action::{Action, Claim};
use crate::card::Character;

/// The card an action claims to hold. `None` means the action claims nothing
/// and cannot be challenged.
pub fn action_required_card(action: &Action) -> Option<Character> {
    match action {
        Action::Tax => Some(Character::Duke),
        Action::Assassinate(_) => Some(Character::Assassin),
        Action::Steal(_) => Some(Character::Captain),
        Action::Exchange => Some(Character::Ambassador),
        Action::Income | Action::ForeignAid | Action::Coup(_) => None,
    }
}

/// The card that proves a claim when it is challenged. A block claim names
/// its card directly.
pub fn required_card_for(claim: &Claim) -> Option<Character> {
    match claim {
        Claim::Action(action) => action_required_card(action),
        Claim::Block { character, .. } => Some(*character),
    }
}

pub fn is_challengeable(claim: &Claim) -> bool {
    required_card_for(claim).is_some()
}

/// Characters that may be claimed to block an action. Empty means the action
/// is unblockable.
pub fn block_characters_for(action: &Action) -> &'static [Character] {
    match action {
        Action::ForeignAid => &[Character::Duke],
        Action::Steal(_) => &[Character::Captain, Character::Ambassador],
        Action::Assassinate(_) => &[Character::Contessa],
        Action::Income | Action::Coup(_) | Action::Tax | Action::Exchange => &[],
    }
}

pub fn is_blockable(action: &Action) -> bool {
    !block_characters_for(action).is_empty()
}

/// Whether `player` may declare a block against `action`. Foreign Aid may be
/// blocked from any seat; targeted actions only by their target.
pub fn may_block(action: &Action, player: usize) -> bool {
    match action {
        Action::ForeignAid => true,
        Action::Assassinate(target) | Action::Steal(target) => *target == player,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_tables_round_trip() {
        assert_eq!(action_required_card(&Action::Tax), Some(Character::Duke));
        assert_eq!(
            action_required_card(&Action::Assassinate(1)),
            Some(Character::Assassin)
        );
        assert_eq!(
            action_required_card(&Action::Steal(1)),
            Some(Character::Captain)
        );
        assert_eq!(
            action_required_card(&Action::Exchange),
            Some(Character::Ambassador)
        );
        assert_eq!(action_required_card(&Action::Income), None);
        assert_eq!(action_required_card(&Action::ForeignAid), None);
        assert_eq!(action_required_card(&Action::Coup(1)), None);
    }

    #[test]
    fn block_claims_prove_their_own_card() {
        let block = Claim::Block {
            character: Character::Ambassador,
            action: Action::Steal(2),
        };
        assert_eq!(required_card_for(&block), Some(Character::Ambassador));
        assert!(is_challengeable(&block));
    }

    #[test]
    fn unchallengeable_actions() {
        assert!(!is_challengeable(&Claim::Action(Action::Income)));
        assert!(!is_challengeable(&Claim::Action(Action::ForeignAid)));
        assert!(!is_challengeable(&Claim::Action(Action::Coup(1))));
        assert!(is_challengeable(&Claim::Action(Action::Tax)));
    }

    #[test]
    fn block_entitlement() {
        assert!(may_block(&Action::ForeignAid, 3));
        assert!(may_block(&Action::Steal(2), 2));
        assert!(!may_block(&Action::Steal(2), 1));
        assert!(may_block(&Action::Assassinate(0), 0));
        assert!(!may_block(&Action::Tax, 1));
        assert_eq!(
            block_characters_for(&Action::Steal(0)),
            &[Character::Captain, Character::Ambassador]
        );
    }
}
