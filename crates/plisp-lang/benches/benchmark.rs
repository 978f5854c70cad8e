use plisp_lang::{Config, Engine, SchedulerKind};

const FIB: &str = "(defun fib (n) (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2)))))";

fn main() {
    divan::main();
}

fn fib_engine(config: Config) -> Engine {
    let mut engine = Engine::new(config);
    engine.eval(FIB).unwrap();
    engine
}

#[divan::bench(args = [20, 25])]
fn eval_fibonacci(bencher: divan::Bencher, n: u64) {
    let mut engine = fib_engine(Config::default());
    let code = format!("(fib {})", n);

    bencher.bench_local(|| engine.eval(&code).unwrap());
}

#[divan::bench(args = [20, 25])]
fn eval_fibonacci_shared_queue(bencher: divan::Bencher, n: u64) {
    let mut engine = fib_engine(Config::default().with_scheduler(SchedulerKind::SharedQueue));
    let code = format!("(fib {})", n);

    bencher.bench_local(|| engine.eval(&code).unwrap());
}

#[divan::bench(args = [20])]
fn eval_fibonacci_sequential(bencher: divan::Bencher, n: u64) {
    let mut engine = fib_engine(Config::default().with_spawn(false));
    let code = format!("(fib {})", n);

    bencher.bench_local(|| engine.eval(&code).unwrap());
}

#[divan::bench(args = [0, 1, 4])]
fn eval_fibonacci_inline_depth(bencher: divan::Bencher, depth: usize) {
    let mut engine = fib_engine(Config::default().with_spawn(false).with_inline_depth(depth));

    bencher.bench_local(|| engine.eval("(fib 20)").unwrap());
}

#[divan::bench(args = [0, 4])]
fn compile_fibonacci(depth: usize) -> usize {
    let mut engine = Engine::new(Config::default().with_workers(1).with_inline_depth(depth));
    engine.eval(FIB).unwrap();
    engine.define_count()
}

#[divan::bench(name = "parse_nested_arithmetic")]
fn parse_nested_arithmetic() -> plisp_lang::Program {
    plisp_lang::parse("(defun f (a b) (* (+ a 1) (- b (mod a 3)) (if (< a b) (/ a 2) (* b b))))").unwrap()
}
