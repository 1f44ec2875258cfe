//! Recursive-descent evaluator (§4.7).

use super::error::ExprError;
use super::token::{Token, TokenKind};

/// Callbacks the evaluator needs from the host: register lookup by name
/// (without sigil), and a 4-byte memory read for `DEREF`.
pub trait EvalContext {
    fn reg_by_name(&self, name: &str) -> Option<u32>;
    fn read_word(&self, addr: u32) -> u32;
}

/// Evaluate the sub-range `tokens[lo..=hi]`.
pub fn eval(tokens: &[Token], lo: usize, hi: usize, ctx: &dyn EvalContext) -> Result<u32, ExprError> {
    if lo > hi {
        return Err(ExprError::BadExpression);
    }
    if lo == hi {
        return eval_atom(&tokens[lo], ctx);
    }
    if fully_parenthesized(tokens, lo, hi) {
        return eval(tokens, lo + 1, hi - 1, ctx);
    }

    let main_op = find_main_op(tokens, lo, hi).ok_or(ExprError::BadExpression)?;
    apply_operator(tokens, lo, hi, main_op, ctx)
}

fn eval_atom(token: &Token, ctx: &dyn EvalContext) -> Result<u32, ExprError> {
    match token.kind {
        TokenKind::Dec => token
            .lexeme
            .parse::<u32>()
            .map_err(|_| ExprError::BadExpression),
        TokenKind::Hex => {
            let digits = token.lexeme.trim_start_matches("0x").trim_start_matches("0X");
            u32::from_str_radix(digits, 16).map_err(|_| ExprError::BadExpression)
        }
        TokenKind::Reg => ctx
            .reg_by_name(&token.lexeme)
            .ok_or_else(|| ExprError::UnknownRegister(token.lexeme.clone())),
        _ => Err(ExprError::BadExpression),
    }
}

/// True iff `tokens[lo..=hi]` is fully enclosed in one outer pair of
/// balanced parentheses: depth stays ≥1 strictly between the endpoints
/// and reaches 0 only at `hi` (§4.7 step 3; the "intended behavior" the
/// implementer is asked to decide on, per §9's open questions).
fn fully_parenthesized(tokens: &[Token], lo: usize, hi: usize) -> bool {
    if tokens[lo].kind != TokenKind::LParen || tokens[hi].kind != TokenKind::RParen {
        return false;
    }
    let mut depth = 0i32;
    for tok in &tokens[lo..hi] {
        match tok.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => {
                depth -= 1;
                if depth == 0 {
                    // Closed before reaching `hi`: not a single enclosing pair.
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 1
}

/// Find the main operator in `tokens[lo..=hi]`: the operator token with
/// the numerically largest precedence value, breaking ties by rightmost
/// occurrence (left-associative evaluation), skipping tokens nested
/// inside any parenthesis pair. Unary tokens are candidates too, same as
/// binary ones — their precedence value (2) is the lowest of any
/// operator, so a unary token only wins when it's the only operator
/// present in the sub-range (e.g. `-1`, `*0x80000000`); whenever a
/// binary operator also appears it outranks the unary one and wins.
fn find_main_op(tokens: &[Token], lo: usize, hi: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut best: Option<(usize, u8)> = None;
    for i in lo..=hi {
        match tokens[i].kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth -= 1,
            _ if depth == 0 => {
                if let Some(prec) = tokens[i].kind.precedence() {
                    match best {
                        Some((_, best_prec)) if prec < best_prec => {}
                        _ => best = Some((i, prec)),
                    }
                }
            }
            _ => {}
        }
    }
    best.map(|(idx, _)| idx)
}

fn apply_operator(
    tokens: &[Token],
    lo: usize,
    hi: usize,
    op: usize,
    ctx: &dyn EvalContext,
) -> Result<u32, ExprError> {
    use TokenKind::*;

    // find_main_op only ever returns a unary token's index when it's
    // the sole operator in the sub-range, which means it sits at `lo`
    // (a unary operator always precedes its operand).
    if op == lo && tokens[lo].kind.is_unary() {
        let rhs = eval(tokens, lo + 1, hi, ctx)?;
        return Ok(match tokens[lo].kind {
            UPlus => rhs,
            Neg => rhs.wrapping_neg(),
            Deref => ctx.read_word(rhs),
            _ => unreachable!(),
        });
    }

    match tokens[op].kind {
        LAnd => {
            let lhs = eval(tokens, lo, op - 1, ctx)?;
            if lhs == 0 {
                return Ok(0);
            }
            let rhs = eval(tokens, op + 1, hi, ctx)?;
            Ok((rhs != 0) as u32)
        }
        LOr => {
            let lhs = eval(tokens, lo, op - 1, ctx)?;
            if lhs != 0 {
                return Ok(1);
            }
            let rhs = eval(tokens, op + 1, hi, ctx)?;
            Ok((rhs != 0) as u32)
        }
        _ => {
            let lhs = eval(tokens, lo, op - 1, ctx)?;
            let rhs = eval(tokens, op + 1, hi, ctx)?;
            match tokens[op].kind {
                Plus => Ok(lhs.wrapping_add(rhs)),
                Minus => Ok(lhs.wrapping_sub(rhs)),
                Star => Ok(lhs.wrapping_mul(rhs)),
                Slash => {
                    if rhs == 0 {
                        Err(ExprError::DivideByZero)
                    } else {
                        let lhs = lhs as i32;
                        let rhs = rhs as i32;
                        Ok(lhs.wrapping_div(rhs) as u32)
                    }
                }
                Le => Ok(((lhs as i32) <= (rhs as i32)) as u32),
                Eq => Ok((lhs == rhs) as u32),
                Neq => Ok((lhs != rhs) as u32),
                _ => Err(ExprError::BadExpression),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::fixup::fixup;
    use crate::expr::lexer::lex;

    struct TestCtx {
        regs: std::collections::HashMap<&'static str, u32>,
        mem: std::collections::HashMap<u32, u32>,
    }

    impl EvalContext for TestCtx {
        fn reg_by_name(&self, name: &str) -> Option<u32> {
            self.regs.get(name).copied()
        }
        fn read_word(&self, addr: u32) -> u32 {
            *self.mem.get(&addr).unwrap_or(&0)
        }
    }

    fn eval_str(s: &str, ctx: &TestCtx) -> Result<u32, ExprError> {
        let mut tokens = lex(s)?;
        fixup(&mut tokens);
        let hi = tokens.len() - 1;
        eval(&tokens, 0, hi, ctx)
    }

    fn empty_ctx() -> TestCtx {
        TestCtx {
            regs: Default::default(),
            mem: Default::default(),
        }
    }

    #[test]
    fn precedence_respected() {
        let ctx = empty_ctx();
        assert_eq!(eval_str("1 + 2 * 3", &ctx).unwrap(), 7);
        assert_eq!(eval_str("2 * 3 + 1", &ctx).unwrap(), 7);
    }

    #[test]
    fn parenthesization_overrides_precedence() {
        let ctx = empty_ctx();
        assert_eq!(eval_str("(1 + 2) * 3", &ctx).unwrap(), 9);
    }

    #[test]
    fn hex_literal_parses() {
        let ctx = empty_ctx();
        assert_eq!(eval_str("0x10 + 0x20", &ctx).unwrap(), 48);
    }

    #[test]
    fn register_lookup() {
        let mut ctx = empty_ctx();
        ctx.regs.insert("a0", 0xdead_beef);
        assert_eq!(eval_str("$a0", &ctx).unwrap(), 0xdead_beef);
    }

    #[test]
    fn dereference_reads_memory() {
        let mut ctx = empty_ctx();
        ctx.mem.insert(0x8000_0000, 0x1234);
        assert_eq!(eval_str("*0x80000000", &ctx).unwrap(), 0x1234);
    }

    #[test]
    fn short_circuit_and_or_avoid_divide_by_zero() {
        let ctx = empty_ctx();
        assert_eq!(eval_str("0 && (1 / 0)", &ctx).unwrap(), 0);
        assert_eq!(eval_str("1 || (1 / 0)", &ctx).unwrap(), 1);
    }

    #[test]
    fn divide_by_zero_is_a_distinct_error() {
        let ctx = empty_ctx();
        assert_eq!(eval_str("5 / 0", &ctx), Err(ExprError::DivideByZero));
    }

    #[test]
    fn parenthesization_invariance() {
        let ctx = empty_ctx();
        let a = eval_str("1 + 2 * 3 - 4", &ctx).unwrap();
        let b = eval_str("(1 + 2 * 3 - 4)", &ctx).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn neq_negates_eq_and_evaluates_both_sides() {
        let ctx = empty_ctx();
        assert_eq!(eval_str("1 != 2", &ctx).unwrap(), 1);
        assert_eq!(eval_str("2 != 2", &ctx).unwrap(), 0);
    }

    #[test]
    fn le_is_signed() {
        let ctx = empty_ctx();
        assert_eq!(eval_str("-1 <= 0", &ctx).unwrap(), 1);
    }

    #[test]
    fn unknown_register_fails() {
        let ctx = empty_ctx();
        assert_eq!(
            eval_str("$bogus", &ctx),
            Err(ExprError::UnknownRegister("bogus".into()))
        );
    }

    #[test]
    fn leading_unary_minus_evaluates_instead_of_failing() {
        let ctx = empty_ctx();
        assert_eq!(eval_str("-1", &ctx).unwrap(), 0xffff_ffff);
    }
}
