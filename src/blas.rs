// Links the OpenBLAS provider backing ndarray-linalg's least-squares solver.
#[cfg(any(feature = "blas-openblas-static", feature = "blas-openblas-system"))]
#[allow(unused_imports)]
use blas_src as _;

#[cfg(any(feature = "blas-openblas-static", feature = "blas-openblas-system"))]
unsafe extern "C" {
    fn openblas_set_num_threads(num_threads: ::std::os::raw::c_int);
}

/// Cap OpenBLAS threads; per-gene fits already run on the Rayon pool.
pub fn set_openblas_threads(num_threads: usize) {
    #[cfg(any(feature = "blas-openblas-static", feature = "blas-openblas-system"))]
    unsafe {
        openblas_set_num_threads(num_threads.max(1) as i32);
    }
    #[cfg(not(any(feature = "blas-openblas-static", feature = "blas-openblas-system")))]
    let _ = num_threads;
}
