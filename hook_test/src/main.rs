mod scenarios;
mod test_ctx;

use kfx_hook::set_debug;

fn main() {
    set_debug(true);
    scenarios::run_all();
    println!("hook_test all scenarios passed");
}
