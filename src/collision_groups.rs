//! Collision group/mask bits (§6). A collision happens iff
//! `group_a & mask_b != 0 && group_b & mask_a != 0`. Mirrors
//! `PhysicsCollisionGroups.h`'s plain-constant layout rather than wrapping
//! these in a `bitflags!` type, since callers build masks with `!` and `|`
//! against raw group bits the same way the source does.

pub const GROUP_DEFAULT: i16 = 1 << 0;
pub const GROUP_STATIC: i16 = 1 << 1;
pub const GROUP_KINEMATIC: i16 = 1 << 2;
pub const GROUP_DEBRIS: i16 = 1 << 3;
pub const GROUP_TRIGGER: i16 = 1 << 4;
pub const GROUP_MY_AVATAR: i16 = 1 << 5;
pub const GROUP_OTHER_AVATAR: i16 = 1 << 6;
pub const GROUP_MY_ATTACHMENT: i16 = 1 << 7;
pub const GROUP_OTHER_ATTACHMENT: i16 = 1 << 8;
pub const GROUP_COLLISIONLESS: i16 = 1 << 14;

pub const MASK_DEFAULT: i16 = !GROUP_COLLISIONLESS;
pub const MASK_STATIC: i16 = !(GROUP_COLLISIONLESS | GROUP_STATIC);
pub const MASK_KINEMATIC: i16 = MASK_DEFAULT;
pub const MASK_DEBRIS: i16 = !(GROUP_COLLISIONLESS | GROUP_DEBRIS | GROUP_TRIGGER);
pub const MASK_TRIGGER: i16 = MASK_DEBRIS & !GROUP_STATIC;
pub const MASK_MY_AVATAR: i16 = !(GROUP_COLLISIONLESS | GROUP_MY_ATTACHMENT);
pub const MASK_MY_ATTACHMENT: i16 = !(GROUP_COLLISIONLESS | GROUP_MY_AVATAR);
pub const MASK_OTHER_AVATAR: i16 = !(GROUP_COLLISIONLESS | GROUP_OTHER_ATTACHMENT);
pub const MASK_OTHER_ATTACHMENT: i16 = !(GROUP_COLLISIONLESS | GROUP_OTHER_AVATAR);
pub const MASK_COLLISIONLESS: i16 = 0;

/// The predefined groups named in §6. `Default` here is the C++ source's
/// `Default`, renamed `Basic` to avoid colliding with `core::default::Default`
/// in derives that show up on structs carrying this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CollisionGroup {
    Basic,
    Static,
    Kinematic,
    Debris,
    Trigger,
    MyAvatar,
    OtherAvatar,
    MyAttachment,
    OtherAttachment,
    Collisionless,
}

impl CollisionGroup {
    pub fn bits(self) -> i16 {
        match self {
            CollisionGroup::Basic => GROUP_DEFAULT,
            CollisionGroup::Static => GROUP_STATIC,
            CollisionGroup::Kinematic => GROUP_KINEMATIC,
            CollisionGroup::Debris => GROUP_DEBRIS,
            CollisionGroup::Trigger => GROUP_TRIGGER,
            CollisionGroup::MyAvatar => GROUP_MY_AVATAR,
            CollisionGroup::OtherAvatar => GROUP_OTHER_AVATAR,
            CollisionGroup::MyAttachment => GROUP_MY_ATTACHMENT,
            CollisionGroup::OtherAttachment => GROUP_OTHER_ATTACHMENT,
            CollisionGroup::Collisionless => GROUP_COLLISIONLESS,
        }
    }

    /// Mirrors `Physics::getDefaultCollisionMask` (supplemented from
    /// `original_source/libraries/shared/src/PhysicsHelpers.cpp`).
    pub fn default_mask(self) -> i16 {
        match self {
            CollisionGroup::Basic => MASK_DEFAULT,
            CollisionGroup::Static => MASK_STATIC,
            CollisionGroup::Kinematic => MASK_KINEMATIC,
            CollisionGroup::Debris => MASK_DEBRIS,
            CollisionGroup::Trigger => MASK_TRIGGER,
            CollisionGroup::MyAvatar => MASK_MY_AVATAR,
            CollisionGroup::OtherAvatar => MASK_OTHER_AVATAR,
            CollisionGroup::MyAttachment => MASK_MY_ATTACHMENT,
            CollisionGroup::OtherAttachment => MASK_OTHER_ATTACHMENT,
            CollisionGroup::Collisionless => MASK_COLLISIONLESS,
        }
    }
}

pub fn collides(group_a: i16, mask_a: i16, group_b: i16, mask_b: i16) -> bool {
    (group_a & mask_b) != 0 && (group_b & mask_a) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_collides_with_everything_but_collisionless() {
        assert!(collides(GROUP_DEFAULT, MASK_DEFAULT, GROUP_STATIC, MASK_STATIC));
        assert!(!collides(GROUP_DEFAULT, MASK_DEFAULT, GROUP_COLLISIONLESS, MASK_COLLISIONLESS));
    }

    #[test]
    fn static_does_not_collide_with_static() {
        assert!(!collides(GROUP_STATIC, MASK_STATIC, GROUP_STATIC, MASK_STATIC));
    }

    #[test]
    fn trigger_ignores_debris_trigger_and_static() {
        assert!(!collides(GROUP_TRIGGER, MASK_TRIGGER, GROUP_STATIC, MASK_STATIC));
        assert!(!collides(GROUP_TRIGGER, MASK_TRIGGER, GROUP_DEBRIS, MASK_DEBRIS));
    }

    #[test]
    fn avatar_does_not_collide_with_own_attachment() {
        assert!(!collides(
            GROUP_MY_AVATAR,
            MASK_MY_AVATAR,
            GROUP_MY_ATTACHMENT,
            MASK_MY_ATTACHMENT
        ));
    }

    #[test]
    fn default_mask_table_matches_group() {
        assert_eq!(CollisionGroup::Collisionless.default_mask(), 0);
        assert_eq!(CollisionGroup::Static.default_mask(), MASK_STATIC);
    }
}
