//! Tilde expansion.
//!
//! A bare `~` becomes `$HOME`; `~user` resolves only for `root` in the
//! sandbox and stays literal for anybody else. `~+` and `~-` map to the
//! current and previous working directory.

use crate::interp::state::ShellState;
use crate::interp::vars;

pub fn expand_tilde(st: &mut ShellState, user: Option<&str>) -> String {
    match user {
        None => vars::get_string(st, "HOME").unwrap_or_else(|| "~".to_string()),
        Some("+") => st.cwd.clone(),
        Some("-") => st.previous_dir.clone(),
        Some("root") => "/root".to_string(),
        Some(other) => format!("~{}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::vars::set_scalar;

    #[test]
    fn home_and_users() {
        let mut st = ShellState::default();
        set_scalar(&mut st, "HOME", "/home/user", false).unwrap();
        assert_eq!(expand_tilde(&mut st, None), "/home/user");
        assert_eq!(expand_tilde(&mut st, Some("root")), "/root");
        assert_eq!(expand_tilde(&mut st, Some("nobody")), "~nobody");
    }

    #[test]
    fn cwd_forms() {
        let mut st = ShellState::default();
        st.cwd = "/a".into();
        st.previous_dir = "/b".into();
        assert_eq!(expand_tilde(&mut st, Some("+")), "/a");
        assert_eq!(expand_tilde(&mut st, Some("-")), "/b");
    }
}
