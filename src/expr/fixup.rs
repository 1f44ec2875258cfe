//! Operator fix-up: rewrite ambiguous prefix `+`/`-`/`*` to their unary
//! variants (§4.6). A single left-to-right pass; idempotent, since
//! UPLUS/NEG/DEREF are themselves in the "preceding token allows unary"
//! set and never get rewritten a second time.

use super::token::{Token, TokenKind};

pub fn fixup(tokens: &mut [Token]) {
    for i in 0..tokens.len() {
        if !tokens[i].kind.is_fixup_candidate() {
            continue;
        }
        let is_unary = match i.checked_sub(1) {
            None => true,
            Some(prev) => tokens[prev].kind.allows_following_unary(),
        };
        if is_unary {
            tokens[i].kind = match tokens[i].kind {
                TokenKind::Plus => TokenKind::UPlus,
                TokenKind::Minus => TokenKind::Neg,
                TokenKind::Star => TokenKind::Deref,
                other => other,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::lexer::lex;

    #[test]
    fn leading_minus_becomes_neg() {
        let mut tokens = lex("-5").unwrap();
        fixup(&mut tokens);
        assert_eq!(tokens[0].kind, TokenKind::Neg);
    }

    #[test]
    fn minus_after_operand_stays_binary() {
        let mut tokens = lex("5 - 3").unwrap();
        fixup(&mut tokens);
        assert_eq!(tokens[1].kind, TokenKind::Minus);
    }

    #[test]
    fn star_after_paren_becomes_deref() {
        let mut tokens = lex("(*5)").unwrap();
        fixup(&mut tokens);
        assert_eq!(tokens[1].kind, TokenKind::Deref);
    }

    #[test]
    fn double_negative_chains_unary() {
        let mut tokens = lex("- -5").unwrap();
        fixup(&mut tokens);
        assert_eq!(tokens[0].kind, TokenKind::Neg);
        assert_eq!(tokens[1].kind, TokenKind::Neg);
    }

    #[test]
    fn fixup_is_idempotent() {
        let mut tokens = lex("1 + -2 * *3").unwrap();
        fixup(&mut tokens);
        let once = tokens.clone();
        fixup(&mut tokens);
        assert_eq!(tokens, once);
    }
}
