//! End-to-end execution tests: source text through the whole pipeline.

use ember_compiler::bytecode::disassemble;
use ember_runtime::Value;
use ember_vm::{Machine, eval};

fn run(source: &str) -> Value {
    eval(source).expect("program should run")
}

// Evaluate on a worker thread with a generous stack and return the error
// string. The VM recurses through native Rust frames for ordinary (non-tail)
// calls, so exercising the `MAX_CALL_DEPTH` guard (1000 frames) needs more than
// the test harness's default 2 MiB thread stack; otherwise the host stack
// overflows before the guard can report the "call depth" error. The error is a
// plain `String` (unlike `Value`, which is not `Send`), so it crosses the
// thread boundary cleanly.
fn run_err(source: &str) -> String {
    let source = source.to_string();
    std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(move || eval(&source).expect_err("program should fail").to_string())
        .expect("spawn eval thread")
        .join()
        .expect("eval thread panicked")
}

// =============================================================================
// Literals, operators, control flow
// =============================================================================

#[test]
fn test_arithmetic() {
    assert_eq!(run("1 + 2 * 3"), Value::Int(7));
    assert_eq!(run("(1 + 2) * 3"), Value::Int(9));
    assert_eq!(run("10 / 3"), Value::Int(3));
    assert_eq!(run("10 % 3"), Value::Int(1));
    assert_eq!(run("1 + 0.5"), Value::decimal(1.5));
    assert_eq!(run("-5 + 2"), Value::Int(-3));
}

#[test]
fn test_comparisons_and_logic() {
    assert_eq!(run("1 < 2"), Value::Bool(true));
    assert_eq!(run("\"a\" < \"b\""), Value::Bool(true));
    assert_eq!(run("1 == 1 && 2 == 3"), Value::Bool(false));
    // Short-circuit keeps the deciding value.
    assert_eq!(run("nil || 5"), Value::Int(5));
    // The right side never runs: dividing by zero would error.
    assert_eq!(run("false && 1 / 0 == 0"), Value::Bool(false));
}

#[test]
fn test_if_expression() {
    assert_eq!(run("if 1 < 2 { \"yes\" } else { \"no\" }"), Value::str("yes"));
    assert_eq!(run("if false { 1 }"), Value::Nil);
    assert_eq!(
        run("if false { 1 } else if true { 2 } else { 3 }"),
        Value::Int(2)
    );
}

#[test]
fn test_block_value_is_last_expression() {
    assert_eq!(run("let f = || { 1; 2; 3 }; f()"), Value::Int(3));
    assert_eq!(run("let f = || { let x = 9; }; f()"), Value::Nil);
}

// =============================================================================
// Recursion, closures, pipelines
// =============================================================================

#[test]
fn test_placeholder_lambda() {
    // let inc = _ + 1; inc(5) → 6
    assert_eq!(run("let inc = _ + 1; inc(5)"), Value::Int(6));
}

#[test]
fn test_tail_recursion_beyond_host_stack_depth() {
    // 100_000 recursive steps must not overflow: the compiler rewrote the
    // self-call into a loop.
    let source = "let f = |n, acc| if n == 0 { acc } else { f(n - 1, acc + n) }; f(100000, 0)";
    assert_eq!(run(source), Value::Int(5_000_050_000));
}

#[test]
fn test_non_tail_recursion_is_not_rewritten() {
    // Correct at bounded depth...
    let source = "let factorial = |n| if n == 0 { 1 } else { n * factorial(n - 1) }; factorial(10)";
    assert_eq!(run(source), Value::Int(3_628_800));

    // ...and bounded by the host call depth when pushed beyond it.
    let deep = "let f = |n| if n == 0 { 0 } else { 1 + f(n - 1) }; f(100000)";
    assert!(run_err(deep).contains("call depth"));
}

#[test]
fn test_immutable_capture_by_value() {
    assert_eq!(run("let x = 10; let f = || x; f()"), Value::Int(10));
}

#[test]
fn test_rebinding_does_not_affect_existing_closure() {
    let source = "let x = 1; let f = || x; let x = 2; f() + x";
    assert_eq!(run(source), Value::Int(3)); // closure sees 1, top level sees 2
}

#[test]
fn test_pipeline_into_call() {
    assert_eq!(
        run("[1, 2, 3] |> map(_ * 2)"),
        Value::list(vec![Value::Int(2), Value::Int(4), Value::Int(6)])
    );
}

#[test]
fn test_pipeline_into_plain_function_value() {
    assert_eq!(run("let inc = _ + 1; 5 |> inc"), Value::Int(6));
}

#[test]
fn test_pipeline_chain_with_operator_reference() {
    assert_eq!(run("[1, 2, 3] |> map(_ * 2) |> fold(0, +)"), Value::Int(12));
}

#[test]
fn test_composition() {
    let source = "let inc = _ + 1; let double = _ * 2; let f = inc >> double; f(3)";
    assert_eq!(run(source), Value::Int(8));
}

#[test]
fn test_mutual_recursion_either_order() {
    let source = "let even = |n| if n == 0 { true } else { odd(n - 1) };\
                  let odd = |n| if n == 0 { false } else { even(n - 1) };\
                  even(10)";
    assert_eq!(run(source), Value::Bool(true));

    let flipped = "let odd = |n| if n == 0 { false } else { even(n - 1) };\
                   let even = |n| if n == 0 { true } else { odd(n - 1) };\
                   odd(9)";
    assert_eq!(run(flipped), Value::Bool(true));
}

#[test]
fn test_memoized_self_reference() {
    let source = "let fib = memoize(|n| if n < 2 { n } else { fib(n - 1) + fib(n - 2) }); fib(30)";
    // Without memoization fib(30) would take ~1.6M calls; the cache makes it
    // linear, so a correct answer here proves the wrapper saw its own name.
    assert_eq!(run(source), Value::Int(832_040));
}

// =============================================================================
// Shared-cell capture semantics
// =============================================================================

#[test]
fn test_two_closures_share_a_mutable_cell() {
    let source = "let mut count = 0;\
                  let bump = || count = count + 1;\
                  let read = || count;\
                  bump(); bump(); bump();\
                  read()";
    assert_eq!(run(source), Value::Int(3));
}

#[test]
fn test_defining_scope_sees_closure_mutation() {
    let source = "let mut total = 0;\
                  each(|x| total = total + x, [1, 2, 3, 4]);\
                  total";
    assert_eq!(run(source), Value::Int(10));
}

#[test]
fn test_closure_sees_later_scope_mutation() {
    let source = "let mut n = 1;\
                  let read = || n;\
                  n = 42;\
                  read()";
    assert_eq!(run(source), Value::Int(42));
}

#[test]
fn test_counter_factory_cells_are_independent() {
    let source = "let counter = || { let mut n = 0; || n = n + 1 };\
                  let a = counter(); let b = counter();\
                  a(); a(); [a(), b()]";
    assert_eq!(run(source), Value::list(vec![Value::Int(3), Value::Int(1)]));
}

// =============================================================================
// return / break signalling
// =============================================================================

#[test]
fn test_return_exits_function_early() {
    let source = "let f = |n| { if n > 0 { return \"pos\" }; \"neg\" }; [f(1), f(-1)]";
    assert_eq!(
        run(source),
        Value::list(vec![Value::str("pos"), Value::str("neg")])
    );
}

#[test]
fn test_break_stops_fold_with_value() {
    let source = "fold(0, |acc, x| if x > 3 { break acc } else { acc + x }, [1, 2, 3, 4, 5])";
    assert_eq!(run(source), Value::Int(6));
}

#[test]
fn test_break_stops_each_over_unbounded_range() {
    let source = "let mut seen = 0;\
                  each(|x| if x == 5 { break x } else { seen = seen + 1 }, 0..);\
                  seen";
    assert_eq!(run(source), Value::Int(5));
}

#[test]
fn test_break_value_becomes_each_result() {
    let source = "each(|x| if x == 2 { break \"done\" } else { x }, [1, 2, 3])";
    assert_eq!(run(source), Value::str("done"));
}

// =============================================================================
// Collections, patterns, match
// =============================================================================

#[test]
fn test_list_spread_and_index() {
    assert_eq!(
        run("let xs = [2, 3]; [1, ..xs, 4]"),
        Value::list(vec![
            Value::Int(1),
            Value::Int(2),
            Value::Int(3),
            Value::Int(4)
        ])
    );
    assert_eq!(run("[10, 20, 30][1]"), Value::Int(20));
    assert_eq!(run("[10, 20, 30][-1]"), Value::Int(30));
    assert_eq!(run("[10][5]"), Value::Nil);
}

#[test]
fn test_set_and_dict() {
    assert_eq!(run("size({1, 2, 2, 3})"), Value::Int(3));
    assert_eq!(run("#{\"a\": 1, \"b\": 2}[\"b\"]"), Value::Int(2));
    assert_eq!(run("#{\"a\": 1}[\"missing\"]"), Value::Nil);
    assert_eq!(run("size(#{..#{\"a\": 1}, \"b\": 2})"), Value::Int(2));
    assert_eq!(run("keys(#{\"a\": 1, \"b\": 2})"),
        Value::list(vec![Value::str("a"), Value::str("b")]));
}

#[test]
fn test_ranges() {
    assert_eq!(
        run("list(1..4)"),
        Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
    );
    assert_eq!(
        run("list(1..=3)"),
        Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
    );
    assert_eq!(
        run("take(3, 10..)"),
        Value::list(vec![Value::Int(10), Value::Int(11), Value::Int(12)])
    );
    assert_eq!(run("fold(0, +, 1..=100)"), Value::Int(5050));
}

#[test]
fn test_let_destructuring() {
    assert_eq!(run("let [a, b] = [1, 2]; a + b"), Value::Int(3));
    assert_eq!(
        run("let [head, ..tail] = [1, 2, 3]; [head, tail]"),
        Value::list(vec![
            Value::Int(1),
            Value::list(vec![Value::Int(2), Value::Int(3)])
        ])
    );
    assert!(run_err("let [a, b] = [1]; a").contains("did not match"));
}

#[test]
fn test_destructuring_parameter() {
    let source = "let sum_pair = |[a, b]| a + b; sum_pair([3, 4])";
    assert_eq!(run(source), Value::Int(7));
}

#[test]
fn test_rest_parameter() {
    let source = "let gather = |first, ..rest| [first, rest]; gather(1, 2, 3)";
    assert_eq!(
        run(source),
        Value::list(vec![
            Value::Int(1),
            Value::list(vec![Value::Int(2), Value::Int(3)])
        ])
    );
}

#[test]
fn test_match_literals_and_wildcard() {
    let source = "let describe = |n| match n {\
                      0 { \"zero\" },\
                      1..10 { \"small\" },\
                      _ { \"big\" }\
                  };\
                  [describe(0), describe(5), describe(50)]";
    assert_eq!(
        run(source),
        Value::list(vec![
            Value::str("zero"),
            Value::str("small"),
            Value::str("big")
        ])
    );
}

#[test]
fn test_match_list_patterns_and_guard() {
    let source = "let f = |xs| match xs {\
                      [] { \"empty\" },\
                      [x] if x > 10 { \"one big\" },\
                      [x] { \"one\" },\
                      [x, ..rest] { \"many\" }\
                  };\
                  [f([]), f([99]), f([1]), f([1, 2])]";
    assert_eq!(
        run(source),
        Value::list(vec![
            Value::str("empty"),
            Value::str("one big"),
            Value::str("one"),
            Value::str("many")
        ])
    );
}

#[test]
fn test_match_binding_flows_into_body() {
    let source = "match [1, [2, 3]] { [a, [b, c]] { a + b + c }, _ { 0 } }";
    assert_eq!(run(source), Value::Int(6));
}

#[test]
fn test_match_no_arm_is_runtime_error() {
    assert!(run_err("match 5 { 0 { 1 } }").contains("did not match"));
}

#[test]
fn test_if_let() {
    let source = "let classify = |xs| if let [x, ..rest] = xs { x } else { -1 };\
                  [classify([7, 8]), classify([])]";
    assert_eq!(
        run(source),
        Value::list(vec![Value::Int(7), Value::Int(-1)])
    );
}

// =============================================================================
// Builtins
// =============================================================================

#[test]
fn test_higher_order_builtins() {
    assert_eq!(
        run("filter(_ % 2 == 0, [1, 2, 3, 4])"),
        Value::list(vec![Value::Int(2), Value::Int(4)])
    );
    assert_eq!(run("reduce(+, [1, 2, 3, 4])"), Value::Int(10));
    assert_eq!(
        run("scan(0, +, [1, 2, 3])"),
        Value::list(vec![
            Value::Int(0),
            Value::Int(1),
            Value::Int(3),
            Value::Int(6)
        ])
    );
}

#[test]
fn test_collection_builtins() {
    assert_eq!(run("first([5, 6])"), Value::Int(5));
    assert_eq!(run("first([])"), Value::Nil);
    assert_eq!(run("rest([1, 2, 3])"), Value::list(vec![Value::Int(2), Value::Int(3)]));
    assert_eq!(run("push(3, [1, 2])"), Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
    assert_eq!(run("skip(1, [1, 2, 3])"), Value::list(vec![Value::Int(2), Value::Int(3)]));
    assert_eq!(run("[1, 2] |> push(9)"), Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(9)]));
    assert_eq!(run("min(3, 1, 2)"), Value::Int(1));
    assert_eq!(run("max([3, 1, 2])"), Value::Int(3));
    assert_eq!(run("abs(-4)"), Value::Int(4));
    assert_eq!(run("type([])"), Value::str("list"));
}

#[test]
fn test_sort_comparator_idiom_with_operator_reference() {
    // A bare `<` desugars to a two-parameter lambda; folding with it keeps
    // the running minimum.
    let source = "let lt = <; if lt(1, 2) { \"works\" } else { \"broken\" }";
    assert_eq!(run(source), Value::str("works"));
}

// =============================================================================
// Runtime errors
// =============================================================================

#[test]
fn test_runtime_error_taxonomy() {
    assert!(run_err("1 + \"a\"").contains("unsupported operand"));
    assert!(run_err("1 / 0").contains("division by zero"));
    assert!(run_err("let f = |a, b| a; f(1)").contains("arguments"));
    assert!(run_err("5(1)").contains("not callable"));
    assert!(run_err("{|x| x}").contains("unhashable"));
}

#[test]
fn test_calling_forward_reference_before_definition_fails_at_runtime() {
    // Resolution succeeds (the name is hoisted); invoking the still-empty
    // cell is the runtime failure.
    let source = "let g = || f(); let out = g(); let f = || 1; out";
    assert!(run_err(source).contains("before initialization"));
}

#[test]
fn test_forward_reference_after_definition_succeeds() {
    let source = "let g = || f(); let f = || 41; g() + 1";
    assert_eq!(run(source), Value::Int(42));
}

// =============================================================================
// Sections and test blocks
// =============================================================================

#[test]
fn test_sections_run_independently() {
    let source = "input: 20\npart_one: input() + 1\npart_two: part_one() * 2";
    let unit = ember_compiler::compile_source(source).expect("compile error");
    let mut machine = Machine::new(unit);
    machine.run().expect("program should run");
    assert_eq!(machine.run_section("input").unwrap(), Value::Int(20));
    assert_eq!(machine.run_section("part_one").unwrap(), Value::Int(21));
    assert_eq!(machine.run_section("part_two").unwrap(), Value::Int(42));
}

#[test]
fn test_test_block_sections() {
    let source = "part_one: 1\ntest: { expected: 7 }";
    let unit = ember_compiler::compile_source(source).expect("compile error");
    let mut machine = Machine::new(unit);
    machine.run().expect("program should run");
    assert_eq!(machine.run_test_section(0, "expected").unwrap(), Value::Int(7));
    assert!(machine.run_section("expected").is_err());
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn test_compiling_twice_is_deterministic() {
    let source = "let mut acc = 0;\
                  let fib = memoize(|n| if n < 2 { n } else { fib(n - 1) + fib(n - 2) });\
                  [1, 2, 3] |> map(_ * 2) |> each(|x| acc = acc + x);\
                  match acc { 0 { fib(1) }, _ { fib(10) } }";
    let a = ember_compiler::compile_source(source).expect("compile error");
    let b = ember_compiler::compile_source(source).expect("compile error");
    assert_eq!(disassemble(&a), disassemble(&b));

    // Behavioural determinism: both units execute to the same value.
    let va = Machine::new(a).run().expect("run a");
    let vb = Machine::new(b).run().expect("run b");
    assert_eq!(va, vb);
    assert_eq!(va, Value::Int(55));
}
