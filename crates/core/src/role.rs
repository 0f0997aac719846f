/// Access level carried in the `role` claim of a bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Staff,
}

impl Role {
    /// Any value other than `admin` (case-insensitive) is treated as staff.
    pub fn from_claim(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("admin") {
            Self::Admin
        } else {
            Self::Staff
        }
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_claim_is_case_insensitive() {
        assert_eq!(Role::from_claim("ADMIN"), Role::Admin);
        assert_eq!(Role::from_claim(" Admin "), Role::Admin);
        assert!(Role::from_claim("admin").is_admin());
    }

    #[test]
    fn other_claims_are_staff() {
        assert_eq!(Role::from_claim("bodeguero"), Role::Staff);
        assert_eq!(Role::from_claim(""), Role::Staff);
        assert!(!Role::from_claim("cashier").is_admin());
    }
}
